//! Live status line

use std::time::Duration;

use alpaca_conform::StatusSink;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner on stderr showing the step in progress
pub struct SpinnerStatus {
    bar: ProgressBar,
}

impl SpinnerStatus {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {elapsed:>4} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Spinner that draws nothing, for non-interactive output
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn message(&self) -> String {
        self.bar.message()
    }
}

impl Default for SpinnerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for SpinnerStatus {
    fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }
}

impl Drop for SpinnerStatus {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_updates_message() {
        let status = SpinnerStatus::hidden();
        status.set_status("PUT Move - Parameter Position (Good casing)");
        assert_eq!(status.message(), "PUT Move - Parameter Position (Good casing)");
        status.set_status("");
        assert_eq!(status.message(), "");
    }
}
