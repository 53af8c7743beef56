/*!
 * CLI progress renderer
 *
 * Bridges the engine's progress callback onto an indicatif bar with phase,
 * transfer rate, and ETA.
 */

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::progress::{ProgressCallback, ProgressUpdate};

/// Renders one job's sync progress on the terminal
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(job_name: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}%")
                .unwrap()
                .progress_chars("#>-"),
        );
        bar.set_message(format!("syncing {job_name}"));
        Self { bar }
    }

    /// Callback handed to `SyncRequest.progress`
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Arc::new(move |update: &ProgressUpdate| {
            bar.set_position(update.percent as u64);
            let mut message = format!("phase: {}", update.phase.as_str());
            if update.rate_bytes_per_sec > 0.0 {
                message.push_str(&format!(
                    " ({:.2} MB/s)",
                    update.rate_bytes_per_sec / 1_048_576.0
                ));
            }
            if let Some(eta) = update.eta {
                message.push_str(&format!(" eta {}s", eta.as_secs()));
            }
            if let Some(path) = &update.current_path {
                message.push_str(&format!(" - {path}"));
            }
            bar.set_message(message);
        })
    }

    pub fn finish(&self, summary: &str) {
        self.bar.finish_with_message(summary.to_string());
    }
}
