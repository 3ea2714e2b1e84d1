//! Terminal progress rendering for downloads.
//!
//! Bridges the installer's byte-count callback to an `indicatif` bar on
//! stderr. The bar starts as a spinner and switches to a sized bar once
//! the server reports a content length.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use forgeup::Progress;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar fed by the installer's download callback.
#[derive(Debug, Clone)]
pub struct DownloadBar {
    bar: ProgressBar,
    sized: Arc<AtomicBool>,
}

impl DownloadBar {
    /// Creates a spinner-style bar; it gains a length on the first
    /// event that carries a total.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {bytes}")
                .unwrap(),
        );
        bar.set_message("downloading");
        Self {
            bar,
            sized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Callback handle to hand to the installer.
    #[must_use]
    pub fn progress(&self) -> Progress {
        let observer = self.clone();
        Progress::new(move |bytes, total| observer.observe(bytes, total))
    }

    fn observe(&self, bytes: u64, total: Option<u64>) {
        if let Some(total) = total {
            if !self.sized.swap(true, Ordering::Relaxed) {
                self.bar.set_length(total);
                self.bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%)")
                        .unwrap()
                        .progress_chars("#>-"),
                );
            }
        }
        self.bar.set_position(bytes);
    }

    /// Stop rendering and clear the bar's line.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for DownloadBar {
    fn default() -> Self {
        Self::new()
    }
}
