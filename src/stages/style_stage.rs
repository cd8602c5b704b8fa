// Style stage: compiles SCSS/SASS/CSS modules and turns them into style-injecting JavaScript

use crate::core::graph::BuildGraph;
use crate::core::interfaces::{Stage, StageContext, StageResult};
use crate::core::models::ModuleKind;
use crate::infrastructure::processors::{LightningCssProcessor, ScssProcessor};
use crate::utils::{Logger, StageFailure, Timer};
use async_trait::async_trait;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Options: `extensions`, `includePaths` (relative to the project root) and `minimize`
pub struct StyleStage;

/// JavaScript that appends `css` to the document head and default-exports it
pub fn style_injection_module(css: &str) -> String {
    format!(
        "const __css = {};\n\
         if (typeof document !== 'undefined') {{ const style = document.createElement('style'); style.textContent = __css; document.head.appendChild(style); }}\n\
         export default __css;\n",
        serde_json::Value::String(css.to_string())
    )
}

fn compile_style(
    scss: &ScssProcessor,
    css: &LightningCssProcessor,
    path: &Path,
    source: &str,
) -> Result<String, StageFailure> {
    let compiled = if ScssProcessor::is_scss_file(path) {
        scss.compile(source, path)?
    } else {
        source.to_string()
    };
    css.process(&compiled, path)
}

#[async_trait]
impl Stage for StyleStage {
    fn name(&self) -> &str {
        "styles"
    }

    async fn transform(&self, mut graph: BuildGraph, ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
        let extensions = ctx.list_option("extensions", &[".scss", ".sass", ".css"]);
        let include_paths: Vec<PathBuf> = ctx
            .list_option("includePaths", &[])
            .iter()
            .map(|p| ctx.root.join(p))
            .collect();
        let minimize = ctx.bool_option("minimize", true);

        let inputs: Vec<(PathBuf, String)> = graph
            .modules()
            .filter(|m| m.kind == ModuleKind::Style)
            .filter(|m| {
                let name = m.file_name();
                extensions.iter().any(|ext| name.ends_with(ext.as_str()))
            })
            .map(|m| (m.id.clone(), m.transformed.clone()))
            .collect();

        if inputs.is_empty() {
            return Ok(graph);
        }

        let _timer = Timer::start(&format!("Compiling {} stylesheets", inputs.len()));
        let scss = ScssProcessor::new(include_paths, minimize);
        let css = LightningCssProcessor::new(minimize);

        // Stylesheets compile independently; collect keeps graph order
        let compiled: Vec<(PathBuf, Result<String, StageFailure>)> = tokio::task::spawn_blocking(move || {
            inputs
                .into_par_iter()
                .map(|(path, source)| {
                    let result = compile_style(&scss, &css, &path, &source);
                    (path, result)
                })
                .collect()
        })
        .await
        .map_err(|e| StageFailure::new(format!("style compilation task failed: {}", e)))?;

        for (path, result) in compiled {
            let css = result?;
            if let Some(module) = graph.get_mut(&path) {
                Logger::debug(&format!("🎨 {} -> {} bytes of CSS", path.display(), css.len()));
                module.transformed = style_injection_module(&css);
                module.kind = ModuleKind::JavaScript;
                module.source_map = None;
            }
        }

        Ok(graph)
    }
}
