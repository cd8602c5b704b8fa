use crate::core::models::*;
use crate::core::services::BuildOrchestrator;
use crate::core::session::DevSession;
use crate::utils::{CliOverrides, ConfigLoader, Logger, TerminalReporter, CONFIG_FILE_NAME};
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "kiln - single-bundle build orchestrator with watch mode and dev server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the bundle once (or keep watching with --watch)
    Build {
        #[command(flatten)]
        project: ProjectArgs,
        /// Development mode: watch, serve and live reload
        #[arg(short, long)]
        watch: bool,
    },
    /// Development mode; same as `build --watch`
    Dev {
        #[command(flatten)]
        project: ProjectArgs,
        /// Do not start the dev server
        #[arg(long)]
        no_serve: bool,
    },
    /// Write the default kiln.config.json
    InitConfig {
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Clone)]
pub struct ProjectArgs {
    /// Root directory
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,
    /// Config file (default: <root>/kiln.config.json when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Entry module, relative to the root
    #[arg(short, long)]
    pub entry: Option<PathBuf>,
    /// Output bundle file, relative to the root
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Bundle format
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,
    /// Source maps: off, file or inline
    #[arg(long, value_enum)]
    pub sourcemap: Option<SourceMapArg>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Iife,
    Esm,
    Cjs,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Iife => OutputFormat::Iife,
            FormatArg::Esm => OutputFormat::Esm,
            FormatArg::Cjs => OutputFormat::Cjs,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SourceMapArg {
    Off,
    File,
    Inline,
}

impl From<SourceMapArg> for SourceMapMode {
    fn from(arg: SourceMapArg) -> Self {
        match arg {
            SourceMapArg::Off => SourceMapMode::Off,
            SourceMapArg::File => SourceMapMode::File,
            SourceMapArg::Inline => SourceMapMode::Inline,
        }
    }
}

pub struct CliHandler;

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let cli = Cli::parse();

        match cli.command {
            Commands::Build { project, watch } => {
                let mode = ConfigLoader::resolve_mode(watch);
                self.handle_build_command(&project, mode, false).await
            }
            Commands::Dev { project, no_serve } => {
                self.handle_build_command(&project, Mode::Development, no_serve).await
            }
            Commands::InitConfig { root, force } => self.handle_init_command(&root, force),
        }
    }

    async fn handle_build_command(&self, project: &ProjectArgs, mode: Mode, no_serve: bool) -> anyhow::Result<()> {
        let config = load_config(project, mode, no_serve)?;
        let reporter = Arc::new(TerminalReporter::new(config.root.clone()));
        let orchestrator = BuildOrchestrator::new(config)
            .context("Failed to set up the build")?
            .with_observer(reporter);

        if mode.is_production() {
            if let Err(e) = orchestrator.run_build().await {
                eprintln!("{}", e.format_detailed());
                std::process::exit(1);
            }
            return Ok(());
        }

        let shutdown = shutdown_signal();
        DevSession::new(Arc::new(orchestrator))
            .run(shutdown)
            .await
            .context("Watch mode failed")?;
        Ok(())
    }

    fn handle_init_command(&self, root: &Path, force: bool) -> anyhow::Result<()> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }

        let example = ConfigLoader::generate_example()?;
        std::fs::write(&path, format!("{}\n", example))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Logger::info(&format!("📝 Wrote {}", path.display()));
        Ok(())
    }
}

fn load_config(project: &ProjectArgs, mode: Mode, no_serve: bool) -> anyhow::Result<BuildConfig> {
    let file_config = ConfigLoader::load_from_file(&project.root, project.config.as_deref())?;
    let overrides = CliOverrides {
        entry: project.entry.clone(),
        output: project.output.clone(),
        format: project.format.map(Into::into),
        sourcemap: project.sourcemap.map(Into::into),
        no_serve,
    };
    Ok(ConfigLoader::merge_with_cli(
        file_config,
        project.root.clone(),
        &overrides,
        mode,
    ))
}

/// Flips to `true` on Ctrl+C (or SIGTERM on unix)
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        let _ = tx.send(true);
    });

    rx
}
