use tracing::{info, warn, error, debug};
use tracing_subscriber::EnvFilter;
use std::path::Path;
use std::time::Instant;

pub struct Logger;

impl Logger {
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kiln=info"));

        // A second init (tests, embedded use) is harmless
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn build_start(entry: &Path, output: &Path, mode: &str) {
        info!("🔨 kiln - {} build", mode);
        info!("📁 Entry: {}", entry.display());
        info!("📦 Output: {}", output.display());
    }

    pub fn resolving_module(path: &Path) {
        debug!("🔍 Resolving imports of {}", path.display());
    }

    pub fn stage_start(name: &str, modules: usize) {
        debug!("⚙️  Stage {} over {} modules", name, modules);
    }

    pub fn stage_skipped(name: &str, mode: &str) {
        debug!("⏭️  Stage {} disabled in {} mode", name, mode);
    }

    pub fn rebuild_triggered(changed: usize) {
        info!("🔄 Rebuilding... ({} files changed)", changed);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
