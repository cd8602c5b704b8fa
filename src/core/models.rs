use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that switches the build into development/watch mode
pub const WATCH_ENV_VAR: &str = "KILN_WATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Production,
    Development,
}

impl Mode {
    /// Production unless `KILN_WATCH` is set to something other than `0`/`false`
    pub fn from_env() -> Self {
        Self::from_watch_flag(std::env::var(WATCH_ENV_VAR).ok().as_deref())
    }

    pub fn from_watch_flag(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("0") => Mode::Production,
            Some(v) if v.eq_ignore_ascii_case("false") => Mode::Production,
            Some(_) => Mode::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Mode::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Production => "production",
            Mode::Development => "development",
        }
    }
}

/// Wrapping convention of the emitted bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Iife,
    Esm,
    Cjs,
}

impl OutputFormat {
    /// Only `esm` bundles are ES modules; the others run as classic scripts
    pub fn is_module(self) -> bool {
        self == OutputFormat::Esm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SourceMapSetting", into = "SourceMapSetting")]
pub enum SourceMapMode {
    Off,
    File,
    Inline,
}

/// On-disk spelling: `true`, `false` or `"inline"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SourceMapSetting {
    Flag(bool),
    Named(String),
}

impl From<SourceMapSetting> for SourceMapMode {
    fn from(setting: SourceMapSetting) -> Self {
        match setting {
            SourceMapSetting::Flag(true) => SourceMapMode::File,
            SourceMapSetting::Flag(false) => SourceMapMode::Off,
            SourceMapSetting::Named(name) if name == "inline" => SourceMapMode::Inline,
            SourceMapSetting::Named(name) if name == "hidden" || name == "file" => {
                SourceMapMode::File
            }
            SourceMapSetting::Named(_) => SourceMapMode::Off,
        }
    }
}

impl From<SourceMapMode> for SourceMapSetting {
    fn from(mode: SourceMapMode) -> Self {
        match mode {
            SourceMapMode::Off => SourceMapSetting::Flag(false),
            SourceMapMode::File => SourceMapSetting::Flag(true),
            SourceMapMode::Inline => SourceMapSetting::Named("inline".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    pub file: PathBuf,
    pub format: OutputFormat,
    /// Global variable name for `iife` bundles
    pub name: String,
    pub sourcemap: SourceMapMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("public/build/bundle.js"),
            format: OutputFormat::Iife,
            name: "app".to_string(),
            sourcemap: SourceMapMode::File,
        }
    }
}

/// When a declared stage takes part in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnabledWhen {
    #[default]
    Always,
    Production,
    Development,
    Never,
}

impl EnabledWhen {
    pub fn evaluate(self, mode: Mode) -> bool {
        match self {
            EnabledWhen::Always => true,
            EnabledWhen::Production => mode == Mode::Production,
            EnabledWhen::Development => mode == Mode::Development,
            EnabledWhen::Never => false,
        }
    }
}

pub type StageOptions = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    #[serde(default)]
    pub options: StageOptions,
    #[serde(default)]
    pub enabled: EnabledWhen,
}

impl StageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: StageOptions::new(),
            enabled: EnabledWhen::Always,
        }
    }

    pub fn when(mut self, enabled: EnabledWhen) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn option(mut self, key: &str, value: serde_json::Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveConfig {
    pub extensions: Vec<String>,
    /// Prefer the `browser` field of package.json
    pub browser: bool,
    /// Packages always resolved from the project root
    pub dedupe: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: [".mjs", ".js", ".json", ".svelte", ".scss", ".sass", ".css"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            browser: true,
            dedupe: vec!["svelte".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    /// Directory watched for source changes, relative to the project root
    pub root: PathBuf,
    pub debounce_ms: u64,
    /// Path components that never trigger a rebuild
    pub ignore: Vec<String>,
    pub clear_screen: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("src"),
            debounce_ms: 100,
            ignore: vec![".git".to_string(), "node_modules".to_string()],
            clear_screen: false,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServeConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Run through the platform shell
    pub shell: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "npm".to_string(),
            args: ["run", "start", "--", "--dev"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shell: true,
        }
    }
}

impl ServeConfig {
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Immutable build description, created once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub root: PathBuf,
    pub entry: PathBuf,
    pub output: OutputConfig,
    pub mode: Mode,
    pub stages: Vec<StageDescriptor>,
    pub resolve: ResolveConfig,
    pub watch: WatchConfig,
    pub serve: ServeConfig,
}

impl BuildConfig {
    /// Defaults matching a component app: `src/main.js` into `public/build/bundle.js`
    pub fn defaults(root: PathBuf, mode: Mode) -> Self {
        Self {
            root,
            entry: PathBuf::from("src/main.js"),
            output: OutputConfig::default(),
            mode,
            stages: default_stages(),
            resolve: ResolveConfig::default(),
            watch: WatchConfig::default(),
            serve: ServeConfig::default(),
        }
    }

    pub fn entry_path(&self) -> PathBuf {
        self.resolve_path(&self.entry)
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve_path(&self.output.file)
    }

    pub fn watch_root(&self) -> PathBuf {
        self.resolve_path(&self.watch.root)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// The stage list of the default pipeline, in execution order
pub fn default_stages() -> Vec<StageDescriptor> {
    use serde_json::json;

    vec![
        StageDescriptor::new("polyfills"),
        StageDescriptor::new("json"),
        StageDescriptor::new("component").option("css", json!(true)),
        StageDescriptor::new("styles")
            .option("extensions", json!([".scss", ".sass", ".css"]))
            .option("includePaths", json!(["./src/theme", "./node_modules"]))
            .option("minimize", json!(true)),
        StageDescriptor::new("commonjs").option("requireReturnsDefault", json!("preferred")),
        StageDescriptor::new("globals"),
        StageDescriptor::new("livereload")
            .when(EnabledWhen::Development)
            .option("watch", json!("public"))
            .option("port", json!(35729)),
        StageDescriptor::new("minify").when(EnabledWhen::Production),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    JavaScript,
    Json,
    Component,
    Style,
    Unknown,
}

impl ModuleKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" => ModuleKind::JavaScript,
            "json" => ModuleKind::Json,
            "svelte" => ModuleKind::Component,
            "css" | "scss" | "sass" => ModuleKind::Style,
            _ => ModuleKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// Specifier as written in the importing module
    pub specifier: String,
    pub resolved: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleNode {
    /// Resolved absolute path
    pub id: PathBuf,
    pub kind: ModuleKind,
    pub source: String,
    pub transformed: String,
    /// Statements placed ahead of the body on the module's wrapper line
    pub prelude: String,
    /// Source map fragment (JSON) from transformed back to source
    pub source_map: Option<String>,
    pub imports: Vec<ImportRecord>,
}

impl ModuleNode {
    pub fn new(id: PathBuf, source: String) -> Self {
        let kind = ModuleKind::from_path(&id);
        Self {
            id,
            kind,
            transformed: source.clone(),
            source,
            prelude: String::new(),
            source_map: None,
            imports: Vec::new(),
        }
    }

    pub fn with_import(mut self, specifier: impl Into<String>, resolved: impl Into<PathBuf>) -> Self {
        self.imports.push(ImportRecord {
            specifier: specifier.into(),
            resolved: resolved.into(),
        });
        self
    }

    pub fn file_name(&self) -> &str {
        self.id
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
    }
}

/// Stable module identifier inside a bundle: root-relative, forward slashes
pub fn bundle_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// Rendered bundle text travelling through the chunk hooks
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub file_name: String,
    pub format: OutputFormat,
    pub code: String,
    pub map: Option<sourcemap::SourceMap>,
}

#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub content: String,
    pub source_map: Option<String>,
    pub map_path: Option<PathBuf>,
    pub hash: String,
}

impl BuildArtifact {
    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn bytes(&self) -> &[u8] {
        self.content.as_bytes()
    }

    pub fn gzip_size(&self) -> usize {
        use flate2::{write::GzEncoder, Compression};
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(self.bytes()).is_err() {
            return 0;
        }
        encoder.finish().map(|out| out.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl WatchEvent {
    pub fn new(path: PathBuf, kind: ChangeKind) -> Self {
        Self {
            path,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one build attempt, handed to observers
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub success: bool,
    pub duration: Duration,
    pub output: PathBuf,
    pub modules: usize,
    pub artifact_size: Option<usize>,
    pub gzip_size: Option<usize>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_watch_flag() {
        assert_eq!(Mode::from_watch_flag(None), Mode::Production);
        assert_eq!(Mode::from_watch_flag(Some("")), Mode::Production);
        assert_eq!(Mode::from_watch_flag(Some("0")), Mode::Production);
        assert_eq!(Mode::from_watch_flag(Some("FALSE")), Mode::Production);
        assert_eq!(Mode::from_watch_flag(Some("true")), Mode::Development);
        assert_eq!(Mode::from_watch_flag(Some("1")), Mode::Development);
    }

    #[test]
    fn test_enabled_predicate() {
        assert!(EnabledWhen::Always.evaluate(Mode::Production));
        assert!(EnabledWhen::Production.evaluate(Mode::Production));
        assert!(!EnabledWhen::Production.evaluate(Mode::Development));
        assert!(EnabledWhen::Development.evaluate(Mode::Development));
        assert!(!EnabledWhen::Never.evaluate(Mode::Development));
    }

    #[test]
    fn test_sourcemap_setting_spellings() {
        let inline: SourceMapMode = serde_json::from_str("\"inline\"").unwrap();
        let on: SourceMapMode = serde_json::from_str("true").unwrap();
        let off: SourceMapMode = serde_json::from_str("false").unwrap();
        assert_eq!(inline, SourceMapMode::Inline);
        assert_eq!(on, SourceMapMode::File);
        assert_eq!(off, SourceMapMode::Off);
        assert_eq!(serde_json::to_string(&SourceMapMode::Inline).unwrap(), "\"inline\"");
    }

    #[test]
    fn test_default_pipeline_order() {
        let names: Vec<String> = default_stages().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["polyfills", "json", "component", "styles", "commonjs", "globals", "livereload", "minify"]
        );
    }

    #[test]
    fn test_module_kind_from_path() {
        assert_eq!(ModuleKind::from_path(Path::new("a/main.js")), ModuleKind::JavaScript);
        assert_eq!(ModuleKind::from_path(Path::new("App.svelte")), ModuleKind::Component);
        assert_eq!(ModuleKind::from_path(Path::new("theme.SCSS")), ModuleKind::Style);
        assert_eq!(ModuleKind::from_path(Path::new("data.json")), ModuleKind::Json);
        assert_eq!(ModuleKind::from_path(Path::new("README")), ModuleKind::Unknown);
    }

    #[test]
    fn test_bundle_id_is_root_relative() {
        let root = Path::new("/project");
        assert_eq!(bundle_id(root, Path::new("/project/src/main.js")), "src/main.js");
        assert_eq!(bundle_id(root, Path::new("/elsewhere/x.js")), "/elsewhere/x.js");
    }

    #[test]
    fn test_output_paths_resolve_against_root() {
        let config = BuildConfig::defaults(PathBuf::from("/project"), Mode::Production);
        assert_eq!(config.entry_path(), PathBuf::from("/project/src/main.js"));
        assert_eq!(
            config.output_path(),
            PathBuf::from("/project/public/build/bundle.js")
        );
    }
}
