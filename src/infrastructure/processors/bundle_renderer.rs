use crate::core::graph::BuildGraph;
use crate::core::models::{bundle_id, ModuleKind, ModuleNode, OutputConfig, OutputFormat, RenderedChunk, SourceMapMode};
use crate::infrastructure::processors::JsModuleProcessor;
use crate::utils::{BuildError, Result, Timer};
use sourcemap::{SourceMap, SourceMapBuilder};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Module registry shared by every bundle
const RUNTIME: &str = r#"var __modules = {};
var __cache = {};
function __define(id, factory) { __modules[id] = factory; }
function __require(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  var module = __cache[id] = { exports: {} };
  __modules[id].call(module.exports, module, module.exports, __require);
  return module.exports;
}
function __export(target, getters) {
  Object.defineProperty(target, '__esModule', { value: true });
  for (var key in getters) Object.defineProperty(target, key, { enumerable: true, get: getters[key] });
}
function __reexport(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key === 'default' || Object.prototype.hasOwnProperty.call(target, key)) return;
    Object.defineProperty(target, key, { enumerable: true, get: function () { return source[key]; } });
  });
}
function __default(module) { return module && module.__esModule ? module.default : module; }
function __preferDefault(module) {
  if (!module || !module.__esModule || !('default' in module)) return module;
  var named = Object.keys(module).filter(function (key) { return key !== 'default'; });
  return named.length === 0 ? module.default : module;
}"#;

/// Concatenates a module graph into one chunk in dependency order
pub struct BundleRenderer {
    root: PathBuf,
    output: OutputConfig,
    linker: JsModuleProcessor,
}

/// Bundle text with a running line count
struct ChunkWriter {
    code: String,
    line: u32,
}

impl ChunkWriter {
    fn push_line(&mut self, text: &str) {
        self.code.push_str(text);
        self.code.push('\n');
        self.line += line_count(text);
    }
}

fn line_count(text: &str) -> u32 {
    text.split('\n').count() as u32
}

impl BundleRenderer {
    pub fn new(root: PathBuf, output: OutputConfig) -> Self {
        Self {
            root,
            output,
            linker: JsModuleProcessor::new(),
        }
    }

    pub fn file_name(&self) -> String {
        self.output
            .file
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("bundle.js")
            .to_string()
    }

    pub fn render(&self, graph: &BuildGraph) -> Result<RenderedChunk> {
        let _timer = Timer::start("Rendering bundle");
        let order = graph.dependency_order()?;
        let file_name = self.file_name();

        let mut builder = match self.output.sourcemap {
            SourceMapMode::Off => None,
            _ => Some(SourceMapBuilder::new(Some(&file_name))),
        };

        let mut writer = ChunkWriter {
            code: String::new(),
            line: 0,
        };

        match self.output.format {
            OutputFormat::Iife => writer.push_line(&format!("var {} = (function () {{", self.output.name)),
            OutputFormat::Esm | OutputFormat::Cjs => writer.push_line("var __kiln_entry = (function () {"),
        }
        writer.push_line("'use strict';");
        writer.push_line(RUNTIME);

        for module in order {
            if module.kind != ModuleKind::JavaScript {
                return Err(BuildError::Parse {
                    path: module.id.clone(),
                    message: "no stage converted this module to JavaScript".to_string(),
                });
            }

            let id = bundle_id(&self.root, &module.id);
            let ids: BTreeMap<String, String> = module
                .imports
                .iter()
                .map(|record| (record.specifier.clone(), bundle_id(&self.root, &record.resolved)))
                .collect();
            let linked = self.linker.link_module(&module.transformed, &ids);

            let mut header = module.prelude.clone();
            if let Some(exports) = linked.export_header() {
                if !header.is_empty() {
                    header.push(' ');
                }
                header.push_str(&exports);
            }
            writer.push_line(&format!(
                "__define({}, function (module, exports, __require) {{ {}",
                quote(&id),
                header
            ));
            let first_line = writer.line;
            writer.push_line(&linked.code);
            writer.push_line("});");

            if let Some(builder) = builder.as_mut() {
                add_module_mappings(builder, module, &id, first_line, line_count(&linked.code));
            }
        }

        let entry_id = bundle_id(&self.root, graph.entry());
        writer.push_line(&format!("return __require({});", quote(&entry_id)));
        writer.push_line("})();");
        match self.output.format {
            OutputFormat::Iife => {}
            OutputFormat::Esm => writer.push_line("export default __kiln_entry;"),
            OutputFormat::Cjs => writer.push_line("module.exports = __kiln_entry;"),
        }

        Ok(RenderedChunk {
            file_name,
            format: self.output.format,
            code: writer.code,
            map: builder.map(SourceMapBuilder::into_sourcemap),
        })
    }
}

/// Line-level mappings for one module, through its own fragment map when it has one
fn add_module_mappings(
    builder: &mut SourceMapBuilder,
    module: &ModuleNode,
    id: &str,
    first_line: u32,
    lines: u32,
) {
    let source_id = builder.add_source(id);
    builder.set_source_contents(source_id, Some(&module.source));

    let fragment = module
        .source_map
        .as_deref()
        .and_then(|json| SourceMap::from_slice(json.as_bytes()).ok());
    let last_source_line = line_count(&module.source).saturating_sub(1);

    for line in 0..lines {
        let (src_line, src_col) = match &fragment {
            Some(map) => match map.lookup_token(line, 0) {
                Some(token) => (token.get_src_line(), token.get_src_col()),
                None => continue,
            },
            None => (line.min(last_source_line), 0),
        };
        builder.add_raw(first_line + line, 0, src_line, src_col, Some(source_id), None, false);
    }
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
