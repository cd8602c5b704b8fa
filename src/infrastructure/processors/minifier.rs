use crate::utils::StageFailure;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use sourcemap::{SourceMap, SourceMapBuilder};
use std::path::PathBuf;

/// Minified code plus the map from it back to its input, when requested
pub struct MinifiedOutput {
    pub code: String,
    pub map: Option<SourceMap>,
}

/// JavaScript minification using oxc
#[derive(Clone, Copy, Debug)]
pub struct OxcMinifier {
    mangle: bool,
    compress: bool,
}

impl OxcMinifier {
    pub fn new(mangle: bool, compress: bool) -> Self {
        Self { mangle, compress }
    }

    /// Minify JavaScript code.
    ///
    /// `as_module` parses the input as an ES module. Classic scripts keep their
    /// top-level `var`s, which are globals there.
    pub fn minify(
        &self,
        source_code: &str,
        filename: &str,
        as_module: bool,
        with_map: bool,
    ) -> Result<MinifiedOutput, StageFailure> {
        let allocator = Allocator::default();
        let source_type = if as_module { SourceType::mjs() } else { SourceType::cjs() };

        let parse_result = Parser::new(&allocator, source_code, source_type).parse();
        if !parse_result.errors.is_empty() {
            let errors: Vec<String> = parse_result
                .errors
                .iter()
                .map(|e| format!("Parse error: {}", e))
                .collect();
            return Err(StageFailure::new(errors.join("\n")));
        }

        let options = MinifierOptions {
            mangle: self.mangle.then(MangleOptions::default),
            compress: self.compress.then(CompressOptions::default),
        };

        // Minify the AST
        let mut program = parse_result.program;
        let minified = Minifier::new(options).minify(&allocator, &mut program);

        let codegen_options = CodegenOptions {
            source_map_path: with_map.then(|| PathBuf::from(filename)),
            ..CodegenOptions::minify()
        };
        let output = Codegen::new()
            .with_options(codegen_options)
            .with_scoping(minified.scoping)
            .build(&program);

        let map = match output.map {
            Some(map) => Some(
                SourceMap::from_slice(map.to_json_string().as_bytes())
                    .map_err(|e| StageFailure::new(format!("invalid minifier source map: {}", e)))?,
            ),
            None => None,
        };

        Ok(MinifiedOutput {
            code: output.code,
            map,
        })
    }

    /// Estimate size reduction percentage
    pub fn calculate_reduction(&self, original: &str, minified: &str) -> f64 {
        let original_size = original.len() as f64;
        let minified_size = minified.len() as f64;

        if original_size == 0.0 {
            return 0.0;
        }

        ((original_size - minified_size) / original_size) * 100.0
    }

    pub fn stats(&self, original: &str, minified: &str) -> MinificationStats {
        MinificationStats {
            original_size: original.len(),
            minified_size: minified.len(),
            reduction_percentage: self.calculate_reduction(original, minified),
            saved_bytes: original.len().saturating_sub(minified.len()),
        }
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// Chain `outer` (minified -> bundle) with `inner` (bundle -> sources)
pub fn compose_source_maps(outer: &SourceMap, inner: &SourceMap) -> SourceMap {
    let mut builder = SourceMapBuilder::new(inner.get_file());

    for (index, source) in inner.sources().enumerate() {
        let id = builder.add_source(source);
        builder.set_source_contents(id, inner.get_source_contents(index as u32));
    }

    for token in outer.tokens() {
        let Some(original) = inner.lookup_token(token.get_src_line(), token.get_src_col()) else {
            continue;
        };
        let Some(source) = original.get_source() else {
            continue;
        };
        let source_id = builder.add_source(source);
        builder.add_raw(
            token.get_dst_line(),
            token.get_dst_col(),
            original.get_src_line(),
            original.get_src_col(),
            Some(source_id),
            None,
            false,
        );
    }

    builder.into_sourcemap()
}

#[derive(Debug, Clone)]
pub struct MinificationStats {
    pub original_size: usize,
    pub minified_size: usize,
    pub reduction_percentage: f64,
    pub saved_bytes: usize,
}

impl std::fmt::Display for MinificationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Minification: {:.1}% reduction ({} → {} bytes, saved {})",
            self.reduction_percentage,
            self.original_size,
            self.minified_size,
            self.saved_bytes
        )
    }
}
