// Watch mode: debounces file-system events into rebuilds

use crate::core::interfaces::RebuildTarget;
use crate::core::models::{ChangeKind, WatchConfig, WatchEvent};
use crate::utils::{BuildError, Logger, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Triggered,
    Building,
    Stopped,
}

/// Turns bursts of change events into single rebuilds.
///
/// Events arriving while a rebuild runs are merged into at most one follow-up
/// rebuild. At most one rebuild runs at any time.
pub struct WatchController {
    debounce: Duration,
    ignored_names: Vec<String>,
    ignored_paths: Vec<PathBuf>,
    clear_screen: bool,
    state: WatchState,
    rebuilds: usize,
}

impl WatchController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            ignored_names: Vec::new(),
            ignored_paths: Vec::new(),
            clear_screen: false,
            state: WatchState::Idle,
            rebuilds: 0,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        let mut controller = Self::new(config.debounce()).with_ignored_names(config.ignore.clone());
        controller.clear_screen = config.clear_screen;
        controller
    }

    /// Path components (e.g. `node_modules`) that never trigger a rebuild
    pub fn with_ignored_names(mut self, names: Vec<String>) -> Self {
        self.ignored_names.extend(names);
        self
    }

    /// Files or directories (e.g. the build output) that never trigger a rebuild
    pub fn with_ignored_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.ignored_paths.extend(paths);
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Check if a changed path should be ignored
    pub fn should_ignore(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        if path_str.ends_with('~') || path_str.ends_with(".swp") || path_str.ends_with(".tmp") {
            return true;
        }

        path.components()
            .any(|c| self.ignored_names.iter().any(|name| c.as_os_str() == name.as_str()))
            || self.ignored_paths.iter().any(|p| path.starts_with(p))
    }

    /// Process events until shutdown is signalled or the event source closes
    pub async fn run<T>(
        &mut self,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        target: &mut T,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()>
    where
        T: RebuildTarget + ?Sized,
    {
        let mut pending: BTreeSet<PathBuf> = BTreeSet::new();

        'watch: loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            if pending.is_empty() {
                self.state = WatchState::Watching;
                tokio::select! {
                    _ = shutdown.changed() => break 'watch,
                    event = events.recv() => match event {
                        Some(event) => self.collect(&mut pending, event),
                        None => break 'watch,
                    },
                }
                if pending.is_empty() {
                    continue;
                }
            }

            // Quiet period: every new event restarts the window
            self.state = WatchState::Triggered;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'watch,
                    _ = tokio::time::sleep(self.debounce) => break,
                    event = events.recv() => match event {
                        Some(event) => self.collect(&mut pending, event),
                        None => break 'watch,
                    },
                }
            }

            self.state = WatchState::Building;
            let changed: Vec<PathBuf> = std::mem::take(&mut pending).into_iter().collect();
            if self.clear_screen {
                print!("\x1B[2J\x1B[1;1H");
            }
            Logger::rebuild_triggered(changed.len());
            for path in &changed {
                Logger::debug(&format!("  • {}", path.display()));
            }

            if let Err(e) = target.rebuild(&changed).await {
                if !e.is_build_local() {
                    self.state = WatchState::Stopped;
                    return Err(e);
                }
                Logger::error(&e.format_detailed());
            }
            self.rebuilds += 1;

            // Everything that arrived mid-build folds into one pending rebuild
            while let Ok(event) = events.try_recv() {
                self.collect(&mut pending, event);
            }
        }

        self.state = WatchState::Stopped;
        Logger::info("👋 Stopping watch mode...");
        Ok(())
    }

    fn collect(&self, pending: &mut BTreeSet<PathBuf>, event: WatchEvent) {
        if self.should_ignore(&event.path) {
            return;
        }
        Logger::debug(&format!("Changed ({:?}): {}", event.kind, event.path.display()));
        pending.insert(event.path);
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        // Ignore metadata-only changes
        _ => None,
    }
}

/// Watch `root` recursively, forwarding changes as [`WatchEvent`]s.
/// The returned watcher must be kept alive for events to flow.
pub fn spawn_fs_watcher(root: &Path) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<WatchEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if let Some(kind) = change_kind(&event.kind) {
                    for path in event.paths {
                        let _ = tx.send(WatchEvent::new(path, kind));
                    }
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| BuildError::Watch(format!("Failed to create watcher: {}", e)))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| BuildError::Watch(format!("Failed to watch {}: {}", root.display(), e)))?;

    Logger::info(&format!("👀 Watching {}", root.display()));
    Ok((watcher, rx))
}
