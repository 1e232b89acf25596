//! Terminal output: a progress bar per run and styled summaries.

use std::path::Path;

use console::Style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::batch::{BatchSummary, ProgressEvent};

/// Progress bar that advances once per processed item.
///
/// The bar is sized lazily from the first event, since its total depends on
/// `start_from` and is only known once the run has validated it.
pub struct BatchProgress {
    pb: ProgressBar,
    green: Style,
    cyan: Style,
    dim: Style,
}

impl BatchProgress {
    pub fn start(label: &str) -> Self {
        Self::with_bar(label, ProgressBar::new(0))
    }

    /// A bar that draws nothing; for tests and non-interactive callers.
    pub fn hidden(label: &str) -> Self {
        Self::with_bar(label, ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden()))
    }

    fn with_bar(label: &str, pb: ProgressBar) -> Self {
        pb.set_style(
            ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .expect("invalid template")
                .progress_chars("=> "),
        );
        pb.set_prefix(label.to_string());
        Self {
            pb,
            green: Style::new().green().bold(),
            cyan: Style::new().cyan(),
            dim: Style::new().dim(),
        }
    }

    pub fn update(&self, event: &ProgressEvent) {
        self.pb.set_length(event.total as u64);
        self.pb.set_position(event.completed as u64);
        self.pb.set_message(status_message(event));
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    pub fn message(&self) -> String {
        self.pb.message().to_string()
    }

    pub fn finish(&self, summary: &BatchSummary, outputs: &[(&str, &Path)]) {
        self.pb.finish_and_clear();
        println!(
            "  {} {} items: {} generated, {} from cache, {} kept",
            self.green.apply_to("✓"),
            summary.completed(),
            summary.generated,
            summary.reused_cache,
            summary.reused_output,
        );
        for (label, path) in outputs {
            println!("  {} {}", self.dim.apply_to(format!("{label}:")), self.cyan.apply_to(path.display()));
        }
    }

    pub fn abandon(&self) {
        self.pb.abandon();
    }
}

/// `[status] item-id`
pub fn status_message(event: &ProgressEvent) -> String {
    format!("[{}] {}", event.status, event.item_id)
}

/// Red `error:` line on stderr.
pub fn print_error(message: &str) {
    eprintln!("{} {message}", Style::new().red().bold().apply_to("error:"));
}
