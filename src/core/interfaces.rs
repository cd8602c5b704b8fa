use crate::core::graph::BuildGraph;
use crate::core::models::*;
use crate::utils::{Result, StageFailure};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub type StageResult<T> = std::result::Result<T, StageFailure>;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// Maps an import specifier, relative to the importing file, to an absolute path
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(&self, specifier: &str, importer: &Path) -> Option<PathBuf>;
}

/// What a stage sees of the build besides the graph or chunk it transforms
pub struct StageContext<'a> {
    pub options: &'a StageOptions,
    pub mode: Mode,
    pub root: &'a Path,
}

impl<'a> StageContext<'a> {
    pub fn bool_option(&self, key: &str, default: bool) -> bool {
        self.options
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn str_option(&self, key: &str) -> Option<&'a str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn u64_option(&self, key: &str, default: u64) -> u64 {
        self.options
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }

    /// A string or list of strings; absent keys yield `default`
    pub fn list_option(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.options.get(key) {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One named transformation of the pipeline.
///
/// `resolve_id` and `load` are consulted while the graph is discovered, ahead
/// of the regular resolver and file system. `transform` runs over the whole
/// module graph before rendering and `render_chunk` runs over the rendered
/// bundle afterwards. Every hook defaults to passing through.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn resolve_id(&self, _specifier: &str, _importer: &Path, _ctx: &StageContext<'_>) -> Option<PathBuf> {
        None
    }

    fn load(&self, _id: &Path, _ctx: &StageContext<'_>) -> Option<String> {
        None
    }

    async fn transform(&self, graph: BuildGraph, _ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
        Ok(graph)
    }

    async fn render_chunk(
        &self,
        chunk: RenderedChunk,
        _ctx: &StageContext<'_>,
    ) -> StageResult<RenderedChunk> {
        Ok(chunk)
    }
}

/// Notified once per build attempt, successful or not
pub trait BuildObserver: Send + Sync {
    fn on_build_finished(&self, summary: &BuildSummary);
}

/// Work performed by the watch controller after a debounced change burst
#[async_trait]
pub trait RebuildTarget: Send {
    async fn rebuild(&mut self, changed: &[PathBuf]) -> Result<()>;
}
