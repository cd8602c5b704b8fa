use crate::core::graph::BuildGraph;
use crate::core::interfaces::{BuildObserver, FileSystemService, ModuleResolver};
use crate::core::models::*;
use crate::core::registry::StageRegistry;
use crate::infrastructure::{BundleRenderer, JsModuleProcessor, NodeModuleResolver, TokioFileSystemService};
use crate::utils::{BuildError, Logger, Result, Timer};
use base64::Engine;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Drives one build at a time: resolve, check, transform, render, write
pub struct BuildOrchestrator {
    config: BuildConfig,
    fs_service: Arc<dyn FileSystemService>,
    resolver: Arc<dyn ModuleResolver>,
    js_processor: JsModuleProcessor,
    registry: StageRegistry,
    renderer: BundleRenderer,
    observers: Vec<Arc<dyn BuildObserver>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl BuildOrchestrator {
    /// Orchestrator with the default file system, node resolver and built-in stages
    pub fn new(config: BuildConfig) -> Result<Self> {
        let config = with_canonical_root(config);
        let resolver = Arc::new(NodeModuleResolver::new(config.root.clone(), &config.resolve));
        let registry = StageRegistry::from_config(&config)?;
        Ok(Self::with_services(
            config,
            Arc::new(TokioFileSystemService),
            resolver,
            registry,
        ))
    }

    pub fn with_services(
        config: BuildConfig,
        fs_service: Arc<dyn FileSystemService>,
        resolver: Arc<dyn ModuleResolver>,
        registry: StageRegistry,
    ) -> Self {
        let config = with_canonical_root(config);
        let renderer = BundleRenderer::new(config.root.clone(), config.output.clone());
        Self {
            config,
            fs_service,
            resolver,
            js_processor: JsModuleProcessor::new(),
            registry,
            renderer,
            observers: Vec::new(),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Run one full build. Concurrent callers are serialized; a failed build writes nothing.
    pub async fn run_build(&self) -> Result<BuildArtifact> {
        let _guard = self.build_lock.lock().await;
        let started = Instant::now();
        Logger::build_start(
            &self.config.entry_path(),
            &self.config.output_path(),
            self.config.mode.as_str(),
        );

        let mut modules = 0;
        let result = self.build_once(&mut modules).await;

        if !self.observers.is_empty() {
            let summary = BuildSummary {
                success: result.is_ok(),
                duration: started.elapsed(),
                output: self.config.output_path(),
                modules,
                artifact_size: result.as_ref().ok().map(BuildArtifact::size),
                gzip_size: result.as_ref().ok().map(BuildArtifact::gzip_size),
                error: result.as_ref().err().map(BuildError::format_detailed),
            };
            for observer in &self.observers {
                observer.on_build_finished(&summary);
            }
        }

        result
    }

    async fn build_once(&self, modules: &mut usize) -> Result<BuildArtifact> {
        let graph = self.load_graph().await?;
        *modules = graph.len();
        graph.check_acyclic()?;

        let graph = {
            let _timer = Timer::start("Applying stages");
            self.registry.apply_stages(graph).await?
        };
        let chunk = self.renderer.render(&graph)?;
        let chunk = self.registry.render_chunk(chunk).await?;
        self.write_artifact(chunk).await
    }

    /// Walk imports breadth-first from the entry, one node per resolved path
    pub async fn load_graph(&self) -> Result<BuildGraph> {
        let _timer = Timer::start("Resolving module graph");
        let entry = self.config.entry_path();
        if !self.fs_service.file_exists(&entry) {
            return Err(BuildError::EntryNotFound { path: entry });
        }
        let entry = self.fs_service.canonicalize(&entry)?;

        // Left as runtime `require` calls by the commonjs stage, so never resolved
        let ignored_requires = self.registry.list_option_of("commonjs", "ignore");

        let mut graph = BuildGraph::new(entry.clone());
        let mut seen: HashSet<PathBuf> = HashSet::from([entry.clone()]);
        let mut queue: VecDeque<PathBuf> = VecDeque::from([entry]);

        while let Some(path) = queue.pop_front() {
            Logger::resolving_module(&path);
            let source = match self.registry.load(&path) {
                Some(source) => source,
                None => self.fs_service.read_file(&path).await?,
            };
            let deps = self.js_processor.extract_dependencies(&source, &path)?;
            let specifiers = deps
                .imports
                .iter()
                .chain(deps.requires.iter().filter(|s| !ignored_requires.contains(s)));

            let mut node = ModuleNode::new(path.clone(), source);
            for specifier in specifiers {
                let resolved = match self.registry.resolve_id(specifier, &path) {
                    Some(id) => id,
                    None => self.resolver.resolve(specifier, &path).await.ok_or_else(|| {
                        BuildError::Resolution {
                            path: specifier.clone(),
                            importer: path.clone(),
                        }
                    })?,
                };

                if seen.insert(resolved.clone()) {
                    queue.push_back(resolved.clone());
                }
                node.imports.push(ImportRecord {
                    specifier: specifier.clone(),
                    resolved,
                });
            }
            graph.insert(node);
        }

        Logger::debug(&format!("📦 Resolved {} modules", graph.len()));
        Ok(graph)
    }

    async fn write_artifact(&self, chunk: RenderedChunk) -> Result<BuildArtifact> {
        let output = self.config.output_path();
        let mut content = chunk.code;
        let mut source_map = None;
        let mut map_path = None;

        if let Some(map) = chunk.map {
            let mut buffer = Vec::new();
            map.to_writer(&mut buffer).map_err(|e| BuildError::Write {
                path: output.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            })?;
            let json = String::from_utf8_lossy(&buffer).into_owned();

            if !content.ends_with('\n') {
                content.push('\n');
            }
            match self.config.output.sourcemap {
                SourceMapMode::Inline => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(json.as_bytes());
                    content.push_str(&format!(
                        "//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}\n",
                        encoded
                    ));
                }
                SourceMapMode::File => {
                    let map_name = format!("{}.map", chunk.file_name);
                    content.push_str(&format!("//# sourceMappingURL={}\n", map_name));
                    map_path = Some(output.with_file_name(map_name));
                }
                SourceMapMode::Off => {}
            }
            source_map = Some(json);
        }

        // Map first: a bundle must never point at a map that was not written
        if let (Some(path), Some(json)) = (&map_path, &source_map) {
            self.fs_service.write_file(path, json).await?;
        }
        self.fs_service.write_file(&output, &content).await?;

        let hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        Logger::info(&format!("✅ Wrote {} ({} bytes)", output.display(), content.len()));

        Ok(BuildArtifact {
            path: output,
            content,
            source_map,
            map_path,
            hash,
        })
    }
}

fn with_canonical_root(mut config: BuildConfig) -> BuildConfig {
    if let Ok(root) = std::fs::canonicalize(&config.root) {
        config.root = root;
    }
    config
}
