use crate::core::interfaces::BuildObserver;
use crate::core::models::BuildSummary;
use colored::*;
use std::path::{Path, PathBuf};

/// Prints a compact, colored summary after every build attempt
pub struct TerminalReporter {
    root: PathBuf,
}

impl TerminalReporter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn display_path<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        path.strip_prefix(&self.root).unwrap_or(path).to_string_lossy()
    }
}

pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} kB", bytes as f64 / 1024.0)
    }
}

impl BuildObserver for TerminalReporter {
    fn on_build_finished(&self, summary: &BuildSummary) {
        let elapsed = format!("{:.0}ms", summary.duration.as_secs_f64() * 1000.0);

        println!();
        if summary.success {
            let size = summary.artifact_size.map(format_size).unwrap_or_default();
            let gzip = summary
                .gzip_size
                .map(|g| format!(" │ gzip: {}", format_size(g)))
                .unwrap_or_default();
            println!(
                "  {} {}",
                self.display_path(&summary.output).bright_cyan(),
                format!("{}{}", size, gzip).bright_black()
            );
            println!(
                "  {} {} modules built in {}",
                "✓".bright_green(),
                summary.modules.to_string().bright_white(),
                elapsed.bright_white().bold()
            );
        } else {
            // The error itself is reported by whoever awaited the build
            let headline = summary
                .error
                .as_deref()
                .and_then(|e| e.lines().next())
                .unwrap_or("build failed");
            println!(
                "  {} {} {}",
                "✗".bright_red(),
                headline.red(),
                format!("({})", elapsed).bright_black()
            );
        }
        println!();
    }
}
