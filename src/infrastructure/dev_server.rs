use crate::core::models::ServeConfig;
use crate::utils::{BuildError, Logger, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

enum ServerState {
    NotStarted,
    Running(Child),
    Stopped,
}

/// Long-running child process serving the built output.
///
/// Started after the first successful build, at most once per session. A
/// failed spawn leaves it unstarted so the next successful build retries.
pub struct DevServer {
    config: ServeConfig,
    cwd: PathBuf,
    state: ServerState,
    spawn_count: usize,
}

impl DevServer {
    pub fn new(config: ServeConfig, cwd: PathBuf) -> Self {
        Self {
            config,
            cwd,
            state: ServerState::NotStarted,
            spawn_count: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, ServerState::Stopped)
    }

    /// Number of processes spawned so far
    pub fn spawn_count(&self) -> usize {
        self.spawn_count
    }

    /// Spawn the server unless it is already running or has been stopped
    pub async fn ensure_started(&mut self) -> Result<()> {
        if !matches!(self.state, ServerState::NotStarted) {
            return Ok(());
        }

        let command_line = self.config.command_line();
        let child = self
            .command()
            .spawn()
            .map_err(|source| BuildError::ServerSpawn {
                command: command_line.clone(),
                source,
            })?;

        Logger::info(&format!(
            "🚀 Dev server started: {} (pid {})",
            command_line,
            child.id().map(|id| id.to_string()).unwrap_or_else(|| "?".to_string())
        ));
        self.spawn_count += 1;
        self.state = ServerState::Running(child);
        Ok(())
    }

    /// Terminate the server; calling it again, or before it started, does nothing
    pub async fn stop(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.state, ServerState::Stopped);
        if let ServerState::Running(mut child) = previous {
            match child.try_wait() {
                Ok(Some(status)) => {
                    Logger::debug(&format!("Dev server already exited with {}", status));
                }
                _ => {
                    if let Err(e) = child.kill().await {
                        Logger::warn(&format!("Failed to stop dev server: {}", e));
                    } else {
                        Logger::info("🛑 Dev server stopped");
                    }
                }
            }
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut command = if self.config.shell {
            shell_command(&self.config.command_line())
        } else {
            let mut command = Command::new(&self.config.command);
            command.args(&self.config.args);
            command
        };

        command
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    // exec so that killing the shell kills the server itself
    let mut command = Command::new("sh");
    command.arg("-c").arg(format!("exec {}", line));
    command
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}
