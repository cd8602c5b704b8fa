use crate::core::graph::BuildGraph;
use crate::core::interfaces::{Stage, StageContext};
use crate::core::models::{BuildConfig, Mode, RenderedChunk, StageDescriptor};
use crate::utils::{BuildError, Logger, Result, StageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct RegisteredStage {
    descriptor: StageDescriptor,
    stage: Arc<dyn Stage>,
}

/// Ordered stage pipeline, materialized once for the build mode.
///
/// Descriptors whose predicate is false for the mode are dropped here, so a
/// disabled stage never runs and costs nothing at build time.
pub struct StageRegistry {
    mode: Mode,
    root: PathBuf,
    stages: Vec<RegisteredStage>,
}

impl StageRegistry {
    pub fn empty(mode: Mode, root: PathBuf) -> Self {
        Self {
            mode,
            root,
            stages: Vec::new(),
        }
    }

    /// Materialize the configured stages using the built-in stage table
    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        Self::materialize(
            &config.stages,
            config.mode,
            config.root.clone(),
            crate::stages::builtin,
        )
    }

    pub fn materialize<F>(
        descriptors: &[StageDescriptor],
        mode: Mode,
        root: PathBuf,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<Arc<dyn Stage>>,
    {
        let mut registry = Self::empty(mode, root);
        for descriptor in descriptors {
            let stage = lookup(&descriptor.name).ok_or_else(|| {
                BuildError::config(format!("unknown stage '{}'", descriptor.name))
            })?;
            registry = registry.with_stage(descriptor.clone(), stage);
        }
        Ok(registry)
    }

    /// Append a stage; it is kept only if enabled for this registry's mode
    pub fn with_stage(mut self, descriptor: StageDescriptor, stage: Arc<dyn Stage>) -> Self {
        if descriptor.enabled.evaluate(self.mode) {
            self.stages.push(RegisteredStage { descriptor, stage });
        } else {
            Logger::stage_skipped(&descriptor.name, self.mode.as_str());
        }
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .map(|s| s.descriptor.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Options of an active stage, by name
    pub fn options_of(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages
            .iter()
            .map(|s| &s.descriptor)
            .find(|d| d.name == name)
    }

    /// String-list option of an active stage; empty when the stage is off
    pub fn list_option_of(&self, name: &str, key: &str) -> Vec<String> {
        self.stages
            .iter()
            .find(|s| s.descriptor.name == name)
            .map(|s| self.context(&s.descriptor).list_option(key, &[]))
            .unwrap_or_default()
    }

    /// First active stage that claims the specifier
    pub fn resolve_id(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        self.stages.iter().find_map(|entry| {
            entry
                .stage
                .resolve_id(specifier, importer, &self.context(&entry.descriptor))
        })
    }

    /// Source supplied by a stage instead of the file system
    pub fn load(&self, id: &Path) -> Option<String> {
        self.stages
            .iter()
            .find_map(|entry| entry.stage.load(id, &self.context(&entry.descriptor)))
    }

    /// Thread the graph through every active stage in order; first failure wins
    pub async fn apply_stages(
        &self,
        graph: BuildGraph,
    ) -> std::result::Result<BuildGraph, StageError> {
        let mut graph = graph;
        for entry in &self.stages {
            Logger::stage_start(&entry.descriptor.name, graph.len());
            let ctx = self.context(&entry.descriptor);
            graph = entry
                .stage
                .transform(graph, &ctx)
                .await
                .map_err(|failure| StageError::from_failure(&entry.descriptor.name, failure))?;
        }
        Ok(graph)
    }

    pub async fn render_chunk(
        &self,
        chunk: RenderedChunk,
    ) -> std::result::Result<RenderedChunk, StageError> {
        let mut chunk = chunk;
        for entry in &self.stages {
            let ctx = self.context(&entry.descriptor);
            chunk = entry
                .stage
                .render_chunk(chunk, &ctx)
                .await
                .map_err(|failure| StageError::from_failure(&entry.descriptor.name, failure))?;
        }
        Ok(chunk)
    }

    fn context<'a>(&'a self, descriptor: &'a StageDescriptor) -> StageContext<'a> {
        StageContext {
            options: &descriptor.options,
            mode: self.mode,
            root: &self.root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interfaces::StageResult;
    use crate::core::models::{EnabledWhen, ModuleNode};
    use crate::utils::StageFailure;
    use async_trait::async_trait;

    /// Appends a marker comment to every module
    struct Marker(&'static str);

    #[async_trait]
    impl Stage for Marker {
        fn name(&self) -> &str {
            self.0
        }

        async fn transform(&self, mut graph: BuildGraph, _ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
            for module in graph.modules_mut() {
                module.transformed.push_str(&format!("\n// {}", self.0));
            }
            Ok(graph)
        }
    }

    struct Failing;

    #[async_trait]
    impl Stage for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn transform(&self, graph: BuildGraph, _ctx: &StageContext<'_>) -> StageResult<BuildGraph> {
            let path = graph.entry().to_path_buf();
            Err(StageFailure::at(path, "boom"))
        }
    }

    /// Serves `virtual:*` specifiers from memory
    struct Virtual;

    #[async_trait]
    impl Stage for Virtual {
        fn name(&self) -> &str {
            "virtual"
        }

        fn resolve_id(&self, specifier: &str, _importer: &Path, ctx: &StageContext<'_>) -> Option<PathBuf> {
            let name = specifier.strip_prefix("virtual:")?;
            Some(ctx.root.join(format!("{}.js", name)))
        }

        fn load(&self, id: &Path, ctx: &StageContext<'_>) -> Option<String> {
            id.starts_with(ctx.root).then(|| "module.exports = 1;".to_string())
        }
    }

    fn lookup(name: &str) -> Option<Arc<dyn Stage>> {
        match name {
            "virtual" => Some(Arc::new(Virtual)),
            "one" => Some(Arc::new(Marker("one"))),
            "two" => Some(Arc::new(Marker("two"))),
            "failing" => Some(Arc::new(Failing)),
            _ => None,
        }
    }

    fn sample_graph() -> BuildGraph {
        let mut graph = BuildGraph::new(PathBuf::from("/p/main.js"));
        graph.insert(ModuleNode::new(PathBuf::from("/p/main.js"), "main();".to_string()));
        graph
    }

    fn transformed(graph: &BuildGraph) -> String {
        graph
            .get(Path::new("/p/main.js"))
            .map(|m| m.transformed.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_stages_run_in_declared_order() {
        let descriptors = vec![StageDescriptor::new("one"), StageDescriptor::new("two")];
        let registry =
            StageRegistry::materialize(&descriptors, Mode::Production, PathBuf::from("/p"), lookup)
                .unwrap();

        let graph = registry.apply_stages(sample_graph()).await.unwrap();
        assert_eq!(transformed(&graph), "main();\n// one\n// two");
    }

    #[tokio::test]
    async fn test_disabled_stage_equals_absent_stage() {
        let with_disabled = vec![
            StageDescriptor::new("one"),
            StageDescriptor::new("two").when(EnabledWhen::Development),
        ];
        let without = vec![StageDescriptor::new("one")];

        let a = StageRegistry::materialize(&with_disabled, Mode::Production, PathBuf::from("/p"), lookup)
            .unwrap();
        let b = StageRegistry::materialize(&without, Mode::Production, PathBuf::from("/p"), lookup)
            .unwrap();

        assert_eq!(a.stage_names(), vec!["one"]);
        let out_a = a.apply_stages(sample_graph()).await.unwrap();
        let out_b = b.apply_stages(sample_graph()).await.unwrap();
        assert_eq!(transformed(&out_a), transformed(&out_b));
    }

    #[tokio::test]
    async fn test_failure_carries_stage_and_path() {
        let descriptors = vec![StageDescriptor::new("failing"), StageDescriptor::new("one")];
        let registry =
            StageRegistry::materialize(&descriptors, Mode::Production, PathBuf::from("/p"), lookup)
                .unwrap();

        let err = registry.apply_stages(sample_graph()).await.unwrap_err();
        assert_eq!(err.stage, "failing");
        assert_eq!(err.path, Some(PathBuf::from("/p/main.js")));
        assert_eq!(err.cause, "boom");
    }

    #[tokio::test]
    async fn test_builtin_pipeline_is_repeatable() {
        let config = crate::core::models::BuildConfig::defaults(PathBuf::from("/p"), Mode::Production);
        let registry = StageRegistry::from_config(&config).unwrap();

        let graph = || {
            let mut graph = BuildGraph::new(PathBuf::from("/p/src/main.js"));
            graph.insert(
                ModuleNode::new(
                    PathBuf::from("/p/src/main.js"),
                    "import data from './data.json';\nconsole.log(process.env.NODE_ENV, data);".to_string(),
                )
                .with_import("./data.json", "/p/src/data.json"),
            );
            graph.insert(ModuleNode::new(
                PathBuf::from("/p/src/data.json"),
                r#"{"a": 1, "b": [true]}"#.to_string(),
            ));
            graph
        };

        let first = registry.apply_stages(graph()).await.unwrap();
        let second = registry.apply_stages(graph()).await.unwrap();
        let texts = |g: &BuildGraph| g.modules().map(|m| m.transformed.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&first), texts(&second));
    }

    #[test]
    fn test_resolution_hooks_consult_active_stages() {
        let descriptors = vec![StageDescriptor::new("one"), StageDescriptor::new("virtual")];
        let registry =
            StageRegistry::materialize(&descriptors, Mode::Production, PathBuf::from("/p"), lookup)
                .unwrap();

        let id = registry.resolve_id("virtual:answer", Path::new("/p/main.js")).unwrap();
        assert_eq!(id, PathBuf::from("/p/answer.js"));
        assert_eq!(registry.load(&id).as_deref(), Some("module.exports = 1;"));
        assert!(registry.resolve_id("./local.js", Path::new("/p/main.js")).is_none());

        let disabled = vec![StageDescriptor::new("virtual").when(EnabledWhen::Never)];
        let registry =
            StageRegistry::materialize(&disabled, Mode::Production, PathBuf::from("/p"), lookup).unwrap();
        assert!(registry.resolve_id("virtual:answer", Path::new("/p/main.js")).is_none());
    }

    #[test]
    fn test_unknown_stage_is_a_config_error() {
        let descriptors = vec![StageDescriptor::new("nope")];
        let result =
            StageRegistry::materialize(&descriptors, Mode::Production, PathBuf::from("/p"), lookup);
        assert!(matches!(result, Err(BuildError::Config(_))));
    }
}
