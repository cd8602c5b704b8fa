// CommonJS stage: links `require()` calls to bundled modules

use crate::core::graph::BuildGraph;
use crate::core::interfaces::{Stage, StageContext, StageResult};
use crate::core::models::{bundle_id, ModuleKind};
use crate::infrastructure::processors::JsModuleProcessor;
use crate::utils::StageFailure;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Options: `requireReturnsDefault` picks what `require()` of an ES module
/// yields (`false`/`"namespace"`, `true`, `"preferred"`); `ignore` lists
/// specifiers left as plain `require` calls.
pub struct CommonJsStage;

fn interop_helper(setting: Option<&Value>) -> Result<Option<&'static str>, StageFailure> {
    match setting {
        None => Ok(Some("__preferDefault")),
        Some(Value::Bool(false)) => Ok(None),
        Some(Value::Bool(true)) => Ok(Some("__default")),
        Some(Value::String(s)) if s == "namespace" => Ok(None),
        Some(Value::String(s)) if s == "preferred" => Ok(Some("__preferDefault")),
        Some(other) => Err(StageFailure::new(format!(
            "unsupported requireReturnsDefault value: {}",
            other
        ))),
    }
}

#[async_trait]
impl Stage for CommonJsStage {
    fn name(&self) -> &str {
        "commonjs"
    }

    async fn transform(&self, mut graph: BuildGraph, ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
        let interop = interop_helper(ctx.options.get("requireReturnsDefault"))?;
        let ignored = ctx.list_option("ignore", &[]);
        let processor = JsModuleProcessor::new();

        for module in graph
            .modules_mut()
            .filter(|m| m.kind == ModuleKind::JavaScript && m.transformed.contains("require"))
        {
            let ids: BTreeMap<String, String> = module
                .imports
                .iter()
                .filter(|record| !ignored.contains(&record.specifier))
                .map(|record| (record.specifier.clone(), bundle_id(ctx.root, &record.resolved)))
                .collect();
            if ids.is_empty() {
                continue;
            }
            module.transformed = processor.link_requires(&module.transformed, &ids, interop);
        }

        Ok(graph)
    }
}
