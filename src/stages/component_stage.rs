// Component stage: compiles single-file `.svelte` components into JavaScript modules
//
// A component file holds an optional `<script>` block, an optional `<style>`
// block and markup. The script becomes the module body, the markup becomes a
// template string and the default export is a small component descriptor.

use crate::core::graph::BuildGraph;
use crate::core::interfaces::{Stage, StageContext, StageResult};
use crate::core::models::{bundle_id, ModuleKind};
use crate::infrastructure::processors::LightningCssProcessor;
use crate::stages::style_stage::style_injection_module;
use crate::utils::StageFailure;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<script(?:\s[^>]*)?>(.*?)</script>").unwrap()
});

static STYLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<style(?:\s[^>]*)?>(.*?)</style>").unwrap()
});

static DEFAULT_EXPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*export\s+default\b").unwrap()
});

/// Options: `css` injects the component's styles (default true); `dev` adds
/// debugging metadata (defaults to true outside production)
pub struct ComponentStage;

#[derive(Debug, PartialEq)]
pub struct ComponentParts<'a> {
    pub script: &'a str,
    pub style: Option<&'a str>,
    pub markup: String,
}

pub fn split_component(source: &str) -> ComponentParts<'_> {
    let script = SCRIPT_REGEX
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    let style = STYLE_REGEX
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    let markup = STYLE_REGEX.replace_all(&SCRIPT_REGEX.replace_all(source, ""), "").trim().to_string();

    ComponentParts {
        script,
        style,
        markup,
    }
}

/// `App.svelte` -> `App`
fn component_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or("Component");
    let mut name: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

#[async_trait]
impl Stage for ComponentStage {
    fn name(&self) -> &str {
        "component"
    }

    async fn transform(&self, mut graph: BuildGraph, ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
        let inject_css = ctx.bool_option("css", true);
        let dev = ctx.bool_option("dev", !ctx.mode.is_production());
        let css_processor = LightningCssProcessor::new(ctx.mode.is_production());

        for module in graph.modules_mut().filter(|m| m.kind == ModuleKind::Component) {
            let parts = split_component(&module.transformed);
            if DEFAULT_EXPORT_REGEX.is_match(parts.script) {
                return Err(StageFailure::at(
                    &module.id,
                    "a component <script> cannot have a default export",
                ));
            }

            let name = component_name(module.file_name());
            let mut code = String::new();
            code.push_str(parts.script.trim_matches('\n'));
            code.push('\n');
            code.push_str(&format!(
                "const __template = {};\n",
                serde_json::Value::String(parts.markup.clone())
            ));

            if let (true, Some(style)) = (inject_css, parts.style) {
                let css = css_processor.process(style, &module.id)?;
                code.push_str(
                    &style_injection_module(&css).replace("export default __css;\n", ""),
                );
            }

            let mut fields = vec![
                format!("name: {}", serde_json::Value::String(name)),
                "template: __template".to_string(),
                "mount: function (target) { target.innerHTML = __template; }".to_string(),
            ];
            if dev {
                fields.push("dev: true".to_string());
                fields.push(format!(
                    "file: {}",
                    serde_json::Value::String(bundle_id(ctx.root, &module.id))
                ));
            }
            code.push_str(&format!("export default {{ {} }};\n", fields.join(", ")));

            module.transformed = code;
            module.kind = ModuleKind::JavaScript;
            module.source_map = None;
        }

        Ok(graph)
    }
}
