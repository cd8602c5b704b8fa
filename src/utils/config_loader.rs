use crate::core::models::*;
use crate::utils::{BuildError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "kiln.config.json";

/// Configuration file format (kiln.config.json). Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KilnConfig {
    /// Entry point file (e.g., "src/main.js")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSection>,

    /// Stage pipeline, replacing the default one when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageDescriptor>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve: Option<ResolveConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve: Option<ServeConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutputSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcemap: Option<SourceMapMode>,
}

impl KilnConfig {
    /// The full default configuration, spelled out
    pub fn example() -> Self {
        let defaults = BuildConfig::defaults(PathBuf::from("."), Mode::Production);
        Self {
            entry: Some(defaults.entry),
            output: Some(OutputSection {
                file: Some(defaults.output.file),
                format: Some(defaults.output.format),
                name: Some(defaults.output.name),
                sourcemap: Some(defaults.output.sourcemap),
            }),
            stages: Some(defaults.stages),
            resolve: Some(defaults.resolve),
            watch: Some(defaults.watch),
            serve: Some(defaults.serve),
        }
    }
}

/// Overrides given on the command line; `None` leaves the file/default value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub entry: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub sourcemap: Option<SourceMapMode>,
    pub no_serve: bool,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `explicit`, or `kiln.config.json` under `root` if it exists.
    /// An explicit path that does not exist is an error.
    pub fn load_from_file(root: &Path, explicit: Option<&Path>) -> Result<Option<KilnConfig>> {
        let config_path = match explicit {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => root.join(path),
            None => root.join(CONFIG_FILE_NAME),
        };

        if !config_path.exists() {
            if explicit.is_some() {
                return Err(BuildError::config(format!(
                    "Config file not found: {}",
                    config_path.display()
                )));
            }
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));
        let content = std::fs::read_to_string(&config_path)?;
        let config: KilnConfig = serde_json::from_str(&content).map_err(|e| {
            BuildError::config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;

        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI > config file > default)
    pub fn merge_with_cli(
        file_config: Option<KilnConfig>,
        root: PathBuf,
        overrides: &CliOverrides,
        mode: Mode,
    ) -> BuildConfig {
        let base = file_config.unwrap_or_default();
        let mut config = BuildConfig::defaults(root, mode);

        if let Some(entry) = base.entry {
            config.entry = entry;
        }
        if let Some(output) = base.output {
            if let Some(file) = output.file {
                config.output.file = file;
            }
            if let Some(format) = output.format {
                config.output.format = format;
            }
            if let Some(name) = output.name {
                config.output.name = name;
            }
            if let Some(sourcemap) = output.sourcemap {
                config.output.sourcemap = sourcemap;
            }
        }
        if let Some(stages) = base.stages {
            config.stages = stages;
        }
        if let Some(resolve) = base.resolve {
            config.resolve = resolve;
        }
        if let Some(watch) = base.watch {
            config.watch = watch;
        }
        if let Some(serve) = base.serve {
            config.serve = serve;
        }

        if let Some(entry) = &overrides.entry {
            config.entry = entry.clone();
        }
        if let Some(output) = &overrides.output {
            config.output.file = output.clone();
        }
        if let Some(format) = overrides.format {
            config.output.format = format;
        }
        if let Some(sourcemap) = overrides.sourcemap {
            config.output.sourcemap = sourcemap;
        }
        if overrides.no_serve {
            config.serve.enabled = false;
        }

        config
    }

    /// `--watch` wins; otherwise the `KILN_WATCH` environment variable
    pub fn resolve_mode(watch_flag: bool) -> Mode {
        if watch_flag {
            Mode::Development
        } else {
            Mode::from_env()
        }
    }

    /// Pretty JSON of the full default configuration
    pub fn generate_example() -> Result<String> {
        Ok(serde_json::to_string_pretty(&KilnConfig::example())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_file_not_exists() {
        let dir = tempdir().unwrap();
        assert!(ConfigLoader::load_from_file(dir.path(), None).unwrap().is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ConfigLoader::load_from_file(dir.path(), Some(Path::new("nope.json"))).unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_load_from_file_valid() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"entry": "src/index.js", "output": {"sourcemap": "inline"}, "stages": [{"name": "json"}]}"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(dir.path(), None).unwrap().unwrap();
        assert_eq!(config.entry, Some(PathBuf::from("src/index.js")));
        assert_eq!(config.output.unwrap().sourcemap, Some(SourceMapMode::Inline));
        let stages = config.stages.unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].enabled, EnabledWhen::Always);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"outdir": "dist"}"#).unwrap();
        let err = ConfigLoader::load_from_file(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("outdir"));
    }

    #[test]
    fn test_merge_with_cli_override() {
        let file_config = KilnConfig {
            entry: Some(PathBuf::from("src/app.js")),
            output: Some(OutputSection {
                file: Some(PathBuf::from("dist/app.js")),
                format: Some(OutputFormat::Esm),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overrides = CliOverrides {
            output: Some(PathBuf::from("out/bundle.js")),
            no_serve: true,
            ..Default::default()
        };

        let merged = ConfigLoader::merge_with_cli(
            Some(file_config),
            PathBuf::from("/p"),
            &overrides,
            Mode::Development,
        );

        assert_eq!(merged.entry, PathBuf::from("src/app.js"));
        assert_eq!(merged.output.file, PathBuf::from("out/bundle.js"));
        assert_eq!(merged.output.format, OutputFormat::Esm);
        assert_eq!(merged.output.name, "app");
        assert_eq!(merged.mode, Mode::Development);
        assert!(!merged.serve.enabled);
        assert_eq!(merged.stages, default_stages());
    }

    #[test]
    fn test_watch_flag_forces_development() {
        assert_eq!(ConfigLoader::resolve_mode(true), Mode::Development);
    }

    #[test]
    fn test_generated_example_loads_back() {
        let dir = tempdir().unwrap();
        let example = ConfigLoader::generate_example().unwrap();
        assert!(example.contains("\"livereload\""));
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), &example).unwrap();

        let loaded = ConfigLoader::load_from_file(dir.path(), None).unwrap().unwrap();
        let merged = ConfigLoader::merge_with_cli(
            Some(loaded),
            dir.path().to_path_buf(),
            &CliOverrides::default(),
            Mode::Production,
        );
        assert_eq!(merged, BuildConfig::defaults(dir.path().to_path_buf(), Mode::Production));
    }
}
