use crate::utils::{Logger, StageFailure};
use std::path::{Path, PathBuf};

/// SCSS/SASS preprocessor using the grass crate
#[derive(Clone, Debug)]
pub struct ScssProcessor {
    include_paths: Vec<PathBuf>,
    minify: bool,
}

impl ScssProcessor {
    pub fn new(include_paths: Vec<PathBuf>, minify: bool) -> Self {
        Self {
            include_paths,
            minify,
        }
    }

    /// Check if a file is SCSS/SASS
    pub fn is_scss_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("scss") | Some("sass")
        )
    }

    /// Compile SCSS/SASS to CSS; imports resolve from the file's directory, then the include paths
    pub fn compile(&self, content: &str, path: &Path) -> Result<String, StageFailure> {
        let _timer = crate::utils::Timer::start(&format!(
            "Compiling SCSS {}",
            path.file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
        ));

        // Detect syntax based on file extension
        let syntax = if path.extension().and_then(|s| s.to_str()) == Some("sass") {
            grass::InputSyntax::Sass
        } else {
            grass::InputSyntax::Scss
        };

        let mut options = grass::Options::default()
            .input_syntax(syntax)
            .style(if self.minify {
                grass::OutputStyle::Compressed
            } else {
                grass::OutputStyle::Expanded
            });
        if let Some(dir) = path.parent() {
            options = options.load_path(dir);
        }
        for include in &self.include_paths {
            options = options.load_path(include);
        }

        match grass::from_string(content.to_string(), &options) {
            Ok(css) => {
                Logger::debug(&format!(
                    "SCSS compiled successfully: {} -> {} bytes",
                    path.display(),
                    css.len()
                ));
                Ok(css)
            }
            Err(e) => Err(StageFailure::at(path, format!("SCSS compilation error: {}", e))),
        }
    }
}
