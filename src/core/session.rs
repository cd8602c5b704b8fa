use crate::core::interfaces::RebuildTarget;
use crate::core::services::BuildOrchestrator;
use crate::infrastructure::{DevServer, LiveReloadNotifier, LiveReloadServer};
use crate::stages::DEFAULT_LIVERELOAD_PORT;
use crate::utils::{spawn_fs_watcher, Logger, Result, WatchController};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Where the browser reload watcher looks and how long it waits
#[derive(Debug, Clone, PartialEq)]
pub struct LiveReloadSettings {
    pub port: u16,
    pub watch_dir: PathBuf,
    pub delay: Duration,
}

/// Development loop: build, keep the dev server up, rebuild on change
pub struct DevSession {
    orchestrator: Arc<BuildOrchestrator>,
    server: DevServer,
}

impl DevSession {
    pub fn new(orchestrator: Arc<BuildOrchestrator>) -> Self {
        let config = orchestrator.config();
        let server = DevServer::new(config.serve.clone(), config.root.clone());
        Self { orchestrator, server }
    }

    pub fn server(&self) -> &DevServer {
        &self.server
    }

    /// Live-reload wiring, present only when the `livereload` stage is active
    pub fn live_reload_settings(&self) -> Option<LiveReloadSettings> {
        let descriptor = self.orchestrator.registry().options_of("livereload")?;
        let options = &descriptor.options;
        let port = options
            .get("port")
            .and_then(|v| v.as_u64())
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_LIVERELOAD_PORT);
        let watch_dir = options
            .get("watch")
            .and_then(|v| v.as_str())
            .unwrap_or("public");
        let delay = options.get("delay").and_then(|v| v.as_u64()).unwrap_or(100);

        Some(LiveReloadSettings {
            port,
            watch_dir: self.orchestrator.config().root.join(watch_dir),
            delay: Duration::from_millis(delay),
        })
    }

    /// One build; a successful one makes sure the dev server is running
    pub async fn build_and_serve(&mut self) -> Result<()> {
        self.orchestrator.run_build().await?;

        if self.orchestrator.config().serve.enabled {
            if let Err(e) = self.server.ensure_started().await {
                // Retried after the next successful build
                Logger::warn(&e.format_detailed());
            }
        }
        Ok(())
    }

    /// Initial build, then watch until `shutdown` flips to true.
    /// The dev server and live-reload socket are released exactly once on the way out.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        if let Err(e) = self.build_and_serve().await {
            if !e.is_build_local() {
                return Err(e);
            }
            Logger::error(&e.format_detailed());
        }

        let config = self.orchestrator.config().clone();
        let (_source_watcher, source_events) = spawn_fs_watcher(&config.watch_root())?;
        let mut ignored = vec![config.output_path()];
        if let Some(dir) = config.output_path().parent() {
            ignored.push(dir.to_path_buf());
        }
        let mut source_controller =
            WatchController::from_config(&config.watch).with_ignored_paths(ignored);

        let live_reload = match self.live_reload_settings() {
            Some(settings) => match LiveReloadServer::bind(settings.port).await {
                Ok(server) => match spawn_fs_watcher(&settings.watch_dir) {
                    Ok((watcher, events)) => Some((Arc::new(server), watcher, events, settings.delay)),
                    Err(e) => {
                        Logger::warn(&format!("Live reload disabled: {}", e));
                        None
                    }
                },
                Err(e) => {
                    Logger::warn(&format!("Live reload disabled: {}", e));
                    None
                }
            },
            None => None,
        };
        let reload_server = live_reload.as_ref().map(|(server, ..)| server.clone());

        let reload_shutdown = shutdown.clone();
        let reload_loop = async move {
            match live_reload {
                Some((server, _watcher, events, delay)) => {
                    let mut notifier = LiveReloadNotifier::new(server);
                    WatchController::new(delay)
                        .run(events, &mut notifier, reload_shutdown)
                        .await
                }
                None => Ok(()),
            }
        };

        let (source_result, reload_result) = tokio::join!(
            source_controller.run(source_events, &mut self, shutdown),
            reload_loop
        );

        self.server.stop().await?;
        if let Some(server) = reload_server {
            server.stop();
        }

        source_result.and(reload_result)
    }
}

#[async_trait]
impl RebuildTarget for DevSession {
    async fn rebuild(&mut self, _changed: &[PathBuf]) -> Result<()> {
        self.build_and_serve().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{BuildConfig, Mode, ServeConfig, SourceMapMode, StageDescriptor};
    use tempfile::tempdir;

    fn write(root: &std::path::Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn config(root: &std::path::Path, serve: ServeConfig) -> BuildConfig {
        let mut config = BuildConfig::defaults(root.to_path_buf(), Mode::Development);
        config.stages = Vec::new();
        config.output.sourcemap = SourceMapMode::Off;
        config.serve = serve;
        config
    }

    fn serve(command: &str, args: &[&str]) -> ServeConfig {
        ServeConfig {
            enabled: true,
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            shell: false,
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_does_not_fail_the_build() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/main.js", "console.log(1);");
        let orchestrator =
            BuildOrchestrator::new(config(dir.path(), serve("kiln-missing-server", &[]))).unwrap();
        let mut session = DevSession::new(Arc::new(orchestrator));

        session.rebuild(&[]).await.unwrap();
        session.rebuild(&[]).await.unwrap();
        assert!(!session.server().is_running());
        assert!(dir.path().join("public/build/bundle.js").exists());
    }

    #[tokio::test]
    async fn test_failed_build_does_not_start_server() {
        let dir = tempdir().unwrap();
        let orchestrator = BuildOrchestrator::new(config(dir.path(), serve("sleep", &["30"]))).unwrap();
        let mut session = DevSession::new(Arc::new(orchestrator));

        assert!(session.rebuild(&[]).await.is_err());
        assert_eq!(session.server().spawn_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_started_once_across_rebuilds() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/main.js", "console.log(1);");
        let orchestrator = BuildOrchestrator::new(config(dir.path(), serve("sleep", &["30"]))).unwrap();
        let mut session = DevSession::new(Arc::new(orchestrator));

        session.rebuild(&[]).await.unwrap();
        session.rebuild(&[]).await.unwrap();
        assert_eq!(session.server().spawn_count(), 1);
        session.server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/main.js", "console.log(1);");
        let mut serve_config = ServeConfig::default();
        serve_config.enabled = false;
        let orchestrator = BuildOrchestrator::new(config(dir.path(), serve_config)).unwrap();
        let session = DevSession::new(Arc::new(orchestrator));

        let (_tx, rx) = watch::channel(true);
        session.run(rx).await.unwrap();
        assert!(dir.path().join("public/build/bundle.js").exists());
    }

    #[test]
    fn test_live_reload_settings_follow_stage_options() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), ServeConfig::default());
        config.stages = vec![StageDescriptor::new("livereload")
            .option("port", serde_json::json!(40000))
            .option("watch", serde_json::json!("dist"))];
        let session = DevSession::new(Arc::new(BuildOrchestrator::new(config).unwrap()));

        let settings = session.live_reload_settings().unwrap();
        assert_eq!(settings.port, 40000);
        assert!(settings.watch_dir.ends_with("dist"));
        assert_eq!(settings.delay, Duration::from_millis(100));
    }

    #[test]
    fn test_no_live_reload_without_stage() {
        let dir = tempdir().unwrap();
        let session = DevSession::new(Arc::new(
            BuildOrchestrator::new(config(dir.path(), ServeConfig::default())).unwrap(),
        ));
        assert!(session.live_reload_settings().is_none());
    }
}
