use std::path::PathBuf;
use thiserror::Error;

/// Failure raised by a single stage, before the registry attaches the stage name
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    pub fn at(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({})", self.message, path.display()),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Stage failure with the identity of the stage that raised it
#[derive(Error, Debug, Clone)]
#[error("stage '{stage}' failed: {cause}")]
pub struct StageError {
    pub stage: String,
    pub path: Option<PathBuf>,
    pub cause: String,
}

impl StageError {
    pub fn from_failure(stage: &str, failure: StageFailure) -> Self {
        Self {
            stage: stage.to_string(),
            path: failure.path,
            cause: failure.message,
        }
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Entry not found: {}", path.display())]
    EntryNotFound { path: PathBuf },

    #[error("Could not resolve '{path}' from {}", importer.display())]
    Resolution { path: String, importer: PathBuf },

    #[error("Circular dependency: {}", format_cycle(cycle_paths))]
    Cycle { cycle_paths: Vec<PathBuf> },

    #[error("Stage '{stage}' failed: {cause}")]
    Stage {
        stage: String,
        path: Option<PathBuf>,
        cause: String,
    },

    #[error("Parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn server '{command}': {source}")]
    ServerSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_cycle(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl BuildError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error ends only the current attempt (watch mode keeps going)
    pub fn is_build_local(&self) -> bool {
        !matches!(self, BuildError::Config(_) | BuildError::Watch(_))
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            BuildError::Resolution { path, importer } => format!(
                "❌ Resolution Error: cannot find '{}'\n📁 Imported by: {}",
                path,
                importer.display()
            ),
            BuildError::Cycle { cycle_paths } => {
                let mut output = String::from("❌ Circular dependency detected:");
                for (i, path) in cycle_paths.iter().enumerate() {
                    let arrow = if i == 0 { "  " } else { "→ " };
                    output.push_str(&format!("\n  {}{}", arrow, path.display()));
                }
                output
            }
            BuildError::Stage { stage, path, cause } => {
                let mut output = format!("❌ Stage Error [{}]: {}", stage, cause);
                if let Some(path) = path {
                    output.push_str(&format!("\n📁 File: {}", path.display()));
                }
                output
            }
            BuildError::Parse { path, message } => format!(
                "❌ Parse Error: {}\n📁 File: {}",
                message,
                path.display()
            ),
            _ => format!("❌ {}", self),
        }
    }
}

impl From<StageError> for BuildError {
    fn from(err: StageError) -> Self {
        BuildError::Stage {
            stage: err.stage,
            path: err.path,
            cause: err.cause,
        }
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        BuildError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_every_path() {
        let err = BuildError::Cycle {
            cycle_paths: vec![
                PathBuf::from("/p/a.js"),
                PathBuf::from("/p/b.js"),
                PathBuf::from("/p/a.js"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Circular dependency: /p/a.js -> /p/b.js -> /p/a.js"
        );
        assert!(err.format_detailed().contains("→ /p/b.js"));
    }

    #[test]
    fn test_stage_error_conversion_keeps_identity() {
        let failure = StageFailure::at("/p/theme.scss", "undefined variable");
        let err: BuildError = StageError::from_failure("styles", failure).into();

        match err {
            BuildError::Stage { stage, path, cause } => {
                assert_eq!(stage, "styles");
                assert_eq!(path, Some(PathBuf::from("/p/theme.scss")));
                assert_eq!(cause, "undefined variable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_build_local_classification() {
        assert!(BuildError::EntryNotFound { path: PathBuf::from("x") }.is_build_local());
        assert!(!BuildError::config("bad").is_build_local());
    }
}
