// Globals stage: provides Node-style `process` and `global` bindings to browser code

use crate::core::graph::BuildGraph;
use crate::core::interfaces::{Stage, StageContext, StageResult};
use crate::core::models::ModuleKind;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static PROCESS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^.\w$])process\.").unwrap());
static GLOBAL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^.\w$])global([^\w$]|$)").unwrap());
static DECLARES_PROCESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:var|let|const|function)\s+process\b").unwrap());
static DECLARES_GLOBAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:var|let|const|function)\s+global\b").unwrap());

/// Options: `env` adds entries to `process.env` next to `NODE_ENV`
pub struct GlobalsStage;

impl GlobalsStage {
    fn process_shim(ctx: &StageContext<'_>) -> String {
        let mut env = serde_json::Map::new();
        env.insert(
            "NODE_ENV".to_string(),
            serde_json::Value::String(ctx.mode.as_str().to_string()),
        );
        if let Some(extra) = ctx.options.get("env").and_then(|v| v.as_object()) {
            for (key, value) in extra {
                env.insert(key.clone(), value.clone());
            }
        }
        format!(
            "var process = {{ env: {}, browser: true }};",
            serde_json::Value::Object(env)
        )
    }
}

fn push_statement(prelude: &mut String, statement: &str) {
    if !prelude.is_empty() {
        prelude.push(' ');
    }
    prelude.push_str(statement);
}

#[async_trait]
impl Stage for GlobalsStage {
    fn name(&self) -> &str {
        "globals"
    }

    async fn transform(&self, mut graph: BuildGraph, ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
        let process_shim = Self::process_shim(ctx);
        let global_shim = "var global = typeof globalThis !== 'undefined' ? globalThis : typeof window !== 'undefined' ? window : {};";

        for module in graph.modules_mut().filter(|m| m.kind == ModuleKind::JavaScript) {
            let code = &module.transformed;
            let needs_process = PROCESS_REGEX.is_match(code) && !DECLARES_PROCESS_REGEX.is_match(code);
            let needs_global = GLOBAL_REGEX.is_match(code) && !DECLARES_GLOBAL_REGEX.is_match(code);

            // Kept out of the body so line-anchored import/export rewriting still sees line 1
            if needs_process {
                push_statement(&mut module.prelude, &process_shim);
            }
            if needs_global {
                push_statement(&mut module.prelude, global_shim);
            }
        }

        Ok(graph)
    }
}
