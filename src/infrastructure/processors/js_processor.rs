use crate::core::models::ModuleKind;
use crate::utils::{BuildError, Result};
use once_cell::sync::Lazy;
use oxc_allocator::Allocator;
use oxc_ast::ast::{CallExpression, Statement};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;

// Pre-compiled regex patterns for performance
// Rewriting only; dependency discovery goes through the AST
static REQUIRE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[^.\w$])require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap()
});

static SCRIPT_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<script(?:\s[^>]*)?>(.*?)</script>").unwrap()
});

static IMPORT_FROM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+([\w$*{][^'";]*?)\s*from\s*['"]([^'"]+)['"][ \t]*;?"#).unwrap()
});

static IMPORT_BARE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s*['"]([^'"]+)['"][ \t]*;?"#).unwrap()
});

static EXPORT_STAR_AS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\*\s*as\s+([\w$]+)\s+from\s*['"]([^'"]+)['"][ \t]*;?"#).unwrap()
});

static EXPORT_STAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\*\s*from\s*['"]([^'"]+)['"][ \t]*;?"#).unwrap()
});

static EXPORT_FROM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\{([^}]*)\}\s*from\s*['"]([^'"]+)['"][ \t]*;?"#).unwrap()
});

static EXPORT_LIST_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?").unwrap()
});

static EXPORT_DEFAULT_DECL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\s*\*?\s*([\w$]+)|class\s+([\w$]+))").unwrap()
});

static EXPORT_DEFAULT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap()
});

static EXPORT_DECL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:const|let|var|class|(?:async\s+)?function\s*\*?)\s+)([\w$]+)").unwrap()
});

static EXPORT_PATTERN_DECL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+(const|let|var)\s+").unwrap()
});

static ESM_SYNTAX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:import(?:\s+[\w$]|\s*[*{'\x22])|export[\s{*])").unwrap()
});

/// A module rewritten into the bundle's module-registry calling convention
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedModule {
    /// Same line count as the input
    pub code: String,
    /// Exported name and the expression its getter returns
    pub exports: Vec<(String, String)>,
    pub is_esm: bool,
}

impl LinkedModule {
    /// `__export(...)` call that installs the export getters, if any are needed
    pub fn export_header(&self) -> Option<String> {
        if !self.is_esm {
            return None;
        }
        let getters: Vec<String> = self
            .exports
            .iter()
            .map(|(name, expr)| {
                format!(
                    "{}: function () {{ return {}; }}",
                    serde_json::Value::String(name.clone()),
                    expr
                )
            })
            .collect();
        Some(format!("__export(exports, {{ {} }});", getters.join(", ")))
    }
}

/// Dependencies of one module as found in its syntax tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleDependencies {
    /// `import`/`export ... from` sources
    pub imports: Vec<String>,
    /// Literal `require("x")` arguments not already imported
    pub requires: Vec<String>,
}

impl ModuleDependencies {
    fn add_import(&mut self, spec: &str) {
        if !self.imports.iter().any(|s| s == spec) {
            self.imports.push(spec.to_string());
        }
        self.requires.retain(|s| s != spec);
    }

    fn add_require(&mut self, spec: &str) {
        if !self.imports.iter().chain(&self.requires).any(|s| s == spec) {
            self.requires.push(spec.to_string());
        }
    }
}

/// Literal `require("x")` calls anywhere in a program; comments and strings never count
#[derive(Default)]
struct RequireCollector {
    specifiers: Vec<String>,
}

impl<'a> Visit<'a> for RequireCollector {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(literal) = it.common_js_require() {
            self.specifiers.push(literal.value.to_string());
        }
        walk::walk_call_expression(self, it);
    }
}

/// Import scanning and module linking for JavaScript sources
#[derive(Clone, Default)]
pub struct JsModuleProcessor;

impl JsModuleProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Specifiers a module depends on, each list in first-appearance order
    pub fn extract_dependencies(&self, source: &str, path: &Path) -> Result<ModuleDependencies> {
        match ModuleKind::from_path(path) {
            ModuleKind::JavaScript => {
                let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());
                let mut deps = ModuleDependencies::default();
                self.scan_script(source, path, source_type, &mut deps)?;
                Ok(deps)
            }
            ModuleKind::Component => {
                let mut deps = ModuleDependencies::default();
                for caps in SCRIPT_BLOCK_REGEX.captures_iter(source) {
                    self.scan_script(&caps[1], path, SourceType::mjs(), &mut deps)?;
                }
                Ok(deps)
            }
            _ => Ok(ModuleDependencies::default()),
        }
    }

    fn scan_script(
        &self,
        source: &str,
        path: &Path,
        source_type: SourceType,
        deps: &mut ModuleDependencies,
    ) -> Result<()> {
        let allocator = Allocator::default();
        let parse_result = Parser::new(&allocator, source, source_type).parse();

        if !parse_result.errors.is_empty() {
            let errors: Vec<String> = parse_result
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect();
            return Err(BuildError::Parse {
                path: path.to_path_buf(),
                message: errors.join("\n"),
            });
        }

        for statement in &parse_result.program.body {
            match statement {
                Statement::ImportDeclaration(decl) => deps.add_import(decl.source.value.as_str()),
                Statement::ExportAllDeclaration(decl) => deps.add_import(decl.source.value.as_str()),
                Statement::ExportNamedDeclaration(decl) => {
                    if let Some(source) = &decl.source {
                        deps.add_import(source.value.as_str());
                    }
                }
                _ => {}
            }
        }

        let mut collector = RequireCollector::default();
        collector.visit_program(&parse_result.program);
        for spec in collector.specifiers {
            deps.add_require(&spec);
        }

        Ok(())
    }

    /// Whether the text still carries ES module syntax
    pub fn is_esm(&self, code: &str) -> bool {
        ESM_SYNTAX_REGEX.is_match(code)
    }

    /// Rewrite ES module syntax into registry calls.
    ///
    /// `ids` maps each specifier to the bundle id of its resolved module.
    /// Specifiers missing from the map are left untouched.
    pub fn link_module(&self, code: &str, ids: &BTreeMap<String, String>) -> LinkedModule {
        let is_esm = self.is_esm(code);
        let mut exports: Vec<(String, String)> = Vec::new();
        let mut counter = 0usize;
        let mut next_binding = || {
            let name = format!("__import_{}", counter);
            counter += 1;
            name
        };

        let code = replace_lines(&EXPORT_STAR_AS_REGEX, code, |caps| match ids.get(&caps[2]) {
            Some(id) => {
                let binding = next_binding();
                exports.push((caps[1].to_string(), binding.clone()));
                format!("var {} = __require({});", binding, quote(id))
            }
            None => caps[0].to_string(),
        });

        let code = replace_lines(&EXPORT_STAR_REGEX, &code, |caps| match ids.get(&caps[1]) {
            Some(id) => format!("__reexport(exports, __require({}));", quote(id)),
            None => caps[0].to_string(),
        });

        let code = replace_lines(&EXPORT_FROM_REGEX, &code, |caps| match ids.get(&caps[2]) {
            Some(id) => {
                let binding = next_binding();
                for (local, exported) in parse_specifier_list(&caps[1]) {
                    let expr = if local == "default" {
                        format!("__default({})", binding)
                    } else {
                        format!("{}.{}", binding, local)
                    };
                    exports.push((exported, expr));
                }
                format!("var {} = __require({});", binding, quote(id))
            }
            None => caps[0].to_string(),
        });

        let code = replace_lines(&IMPORT_FROM_REGEX, &code, |caps| match ids.get(&caps[2]) {
            Some(id) => {
                let binding = next_binding();
                let mut statement = format!("var {} = __require({});", binding, quote(id));
                for line in import_bindings(&caps[1], &binding) {
                    statement.push(' ');
                    statement.push_str(&line);
                }
                statement
            }
            None => caps[0].to_string(),
        });

        let code = replace_lines(&IMPORT_BARE_REGEX, &code, |caps| match ids.get(&caps[1]) {
            Some(id) => format!("__require({});", quote(id)),
            None => caps[0].to_string(),
        });

        let code = replace_lines(&EXPORT_LIST_REGEX, &code, |caps| {
            for (local, exported) in parse_specifier_list(&caps[1]) {
                exports.push((exported, local));
            }
            String::new()
        });

        let code = replace_lines(&EXPORT_DEFAULT_DECL_REGEX, &code, |caps| {
            let name = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or("");
            exports.push(("default".to_string(), name.to_string()));
            format!("{}{}", &caps[1], &caps[2])
        });

        let code = replace_lines(&EXPORT_DEFAULT_REGEX, &code, |caps| {
            format!("{}exports.default = ", &caps[1])
        });

        let code = replace_lines(&EXPORT_DECL_REGEX, &code, |caps| {
            exports.push((caps[3].to_string(), caps[3].to_string()));
            format!("{}{}{}", &caps[1], &caps[2], &caps[3])
        });

        let code = replace_lines(&EXPORT_PATTERN_DECL_REGEX, &code, |caps| {
            format!("{}{} ", &caps[1], &caps[2])
        });

        LinkedModule {
            code,
            exports,
            is_esm,
        }
    }

    /// Rewrite literal `require("x")` calls into registry lookups, optionally
    /// wrapped in an interop helper such as `__default`
    pub fn link_requires(&self, code: &str, ids: &BTreeMap<String, String>, interop: Option<&str>) -> String {
        REQUIRE_REGEX
            .replace_all(code, |caps: &Captures| match ids.get(&caps[2]) {
                Some(id) => match interop {
                    Some(helper) => format!("{}{}(__require({}))", &caps[1], helper, quote(id)),
                    None => format!("{}__require({})", &caps[1], quote(id)),
                },
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Replace every match, padding with the newlines the match spanned
fn replace_lines<F>(regex: &Regex, input: &str, mut replace: F) -> String
where
    F: FnMut(&Captures) -> String,
{
    regex
        .replace_all(input, |caps: &Captures| {
            let mut out = replace(caps);
            let newlines = caps[0].matches('\n').count();
            out.push_str(&"\n".repeat(newlines));
            out
        })
        .into_owned()
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// `a, b as c` into `(local, exported)` pairs
fn parse_specifier_list(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|spec| match spec.split_once(" as ") {
            Some((local, exported)) => (local.trim().to_string(), exported.trim().to_string()),
            None => (spec.to_string(), spec.to_string()),
        })
        .collect()
}

/// Local declarations for an import clause bound to `binding`
fn import_bindings(clause: &str, binding: &str) -> Vec<String> {
    let clause = clause.trim();
    let (default, rest) = if clause.starts_with('{') || clause.starts_with('*') {
        (None, clause)
    } else {
        match clause.split_once(',') {
            Some((default, rest)) => (Some(default.trim()), rest.trim()),
            None => (Some(clause), ""),
        }
    };

    let mut lines = Vec::new();
    if let Some(default) = default {
        lines.push(format!("var {} = __default({});", default, binding));
    }

    if let Some(namespace) = rest.strip_prefix('*') {
        let name = namespace.trim().trim_start_matches("as").trim();
        lines.push(format!("var {} = {};", name, binding));
    } else if let Some(named) = rest.strip_prefix('{') {
        let named = named.trim_end().trim_end_matches('}');
        for (imported, local) in parse_specifier_list(named) {
            if imported == "default" {
                lines.push(format!("var {} = __default({});", local, binding));
            } else {
                lines.push(format!("var {} = {}.{};", local, binding, imported));
            }
        }
    }

    lines
}
