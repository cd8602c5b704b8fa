use crate::utils::{StageFailure, Timer};
use lightningcss::{
    printer::PrinterOptions,
    stylesheet::{MinifyOptions, ParserOptions, StyleSheet},
};
use std::path::Path;

/// Plain-CSS pass shared by the style and component stages: parse, optionally
/// minify, print. Syntax errors fail the stage with the stylesheet's location.
#[derive(Clone, Copy)]
pub struct LightningCssProcessor {
    minify: bool,
}

impl LightningCssProcessor {
    pub fn new(minify: bool) -> Self {
        Self { minify }
    }

    pub fn process(&self, content: &str, path: &Path) -> Result<String, StageFailure> {
        let _timer = Timer::start(&format!(
            "Processing CSS {}",
            path.file_name().and_then(|s| s.to_str()).unwrap_or("unknown")
        ));

        let options = ParserOptions {
            filename: path.display().to_string(),
            ..ParserOptions::default()
        };
        let mut stylesheet = StyleSheet::parse(content, options)
            .map_err(|e| StageFailure::at(path, format!("CSS syntax error: {}", e)))?;

        if self.minify {
            stylesheet
                .minify(MinifyOptions::default())
                .map_err(|e| StageFailure::at(path, format!("CSS minification failed: {}", e)))?;
        }

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: self.minify,
                ..PrinterOptions::default()
            })
            .map_err(|e| StageFailure::at(path, format!("CSS printing failed: {}", e)))?;
        Ok(printed.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minified_output_is_one_line() {
        let processor = LightningCssProcessor::new(true);
        let css = "
        body {
            color: red;
            background: blue;
        }

        .container {
            margin: 0 auto;
        }
        ";

        let result = processor.process(css, Path::new("app.css")).unwrap();
        assert!(result.contains("body"));
        assert!(result.contains(".container"));
        assert!(result.len() < css.len());
        assert!(!result.contains('\n'));
    }

    #[test]
    fn test_unminified_output_keeps_rules() {
        let processor = LightningCssProcessor::new(false);
        let result = processor.process("a { color: red }", Path::new("a.css")).unwrap();
        assert!(result.contains("color: red"));
    }
}
