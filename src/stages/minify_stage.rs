// Minify stage: compresses and mangles the rendered bundle with oxc

use crate::core::interfaces::{Stage, StageContext, StageResult};
use crate::core::models::RenderedChunk;
use crate::infrastructure::processors::{compose_source_maps, OxcMinifier};
use crate::utils::{Logger, StageFailure};
use async_trait::async_trait;

/// Options: `mangle` and `compress`, both on by default
pub struct MinifyStage;

#[async_trait]
impl Stage for MinifyStage {
    fn name(&self) -> &str {
        "minify"
    }

    async fn render_chunk(&self, chunk: RenderedChunk, ctx: &StageContext<'_>) -> StageResult<RenderedChunk> {
        let minifier = OxcMinifier::new(ctx.bool_option("mangle", true), ctx.bool_option("compress", true));

        // oxc is CPU-bound, keep it off the async workers
        tokio::task::spawn_blocking(move || -> StageResult<RenderedChunk> {
            let with_map = chunk.map.is_some();
            let output =
                minifier.minify(&chunk.code, &chunk.file_name, chunk.format.is_module(), with_map)?;
            Logger::debug(&minifier.stats(&chunk.code, &output.code).to_string());

            let map = match (output.map, chunk.map.as_ref()) {
                (Some(outer), Some(inner)) => Some(compose_source_maps(&outer, inner)),
                _ => None,
            };

            Ok(RenderedChunk {
                file_name: chunk.file_name,
                format: chunk.format,
                code: output.code,
                map,
            })
        })
        .await
        .map_err(|e| StageFailure::new(format!("minification task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Mode, OutputFormat, StageOptions};
    use sourcemap::SourceMapBuilder;
    use std::path::Path;

    #[tokio::test]
    async fn test_minified_chunk_keeps_mapping_to_sources() {
        let code = "var app = (function () {\n  var message = 'hello';\n  console.log(message);\n  return message;\n})();\n";
        let mut builder = SourceMapBuilder::new(Some("bundle.js"));
        let src = builder.add_source("src/main.js");
        for line in 0..5 {
            builder.add_raw(line, 0, line, 0, Some(src), None, false);
        }

        let chunk = RenderedChunk {
            file_name: "bundle.js".to_string(),
            format: OutputFormat::Iife,
            code: code.to_string(),
            map: Some(builder.into_sourcemap()),
        };
        let options = StageOptions::new();
        let ctx = StageContext { options: &options, mode: Mode::Production, root: Path::new("/p") };

        let out = MinifyStage.render_chunk(chunk, &ctx).await.unwrap();
        assert!(out.code.len() < code.len());
        assert!(out.code.contains("var app"));
        let map = out.map.unwrap();
        assert!(map.sources().any(|s| s == "src/main.js"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_a_failure() {
        let chunk = RenderedChunk {
            file_name: "bundle.js".to_string(),
            format: OutputFormat::Iife,
            code: "var = ;".to_string(),
            map: None,
        };
        let options = StageOptions::new();
        let ctx = StageContext { options: &options, mode: Mode::Production, root: Path::new("/p") };
        assert!(MinifyStage.render_chunk(chunk, &ctx).await.is_err());
    }
}
