//! End-of-run report

use alpaca_conform_common::DeviceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerEntry;

/// Everything accumulated by one conformance run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub device_type: DeviceType,
    pub device_number: u32,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// The run was cancelled before completion
    pub interrupted: bool,
    pub errors: Vec<LedgerEntry>,
    pub issues: Vec<LedgerEntry>,
    pub information: Vec<LedgerEntry>,
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

impl RunReport {
    /// Number of errors plus issues, zero means the device conforms
    pub fn verdict(&self) -> usize {
        self.errors.len() + self.issues.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.issues.is_empty() && self.information.is_empty()
    }

    /// One-line outcome of the run
    pub fn summary(&self) -> String {
        if self.interrupted {
            "The Alpaca protocol checks were interrupted before completion.".to_string()
        } else if self.is_clean() {
            "Congratulations, there were no errors, issues or information alerts: your device passes Alpaca protocol validation."
                .to_string()
        } else {
            format!(
                "Found {}, {} and {}.",
                plural(self.errors.len(), "error"),
                plural(self.issues.len(), "issue"),
                plural(self.information.len(), "information message")
            )
        }
    }

    /// Summary line followed by every retained message, grouped by severity
    pub fn render(&self) -> String {
        let mut out = self.summary();
        for (title, entries) in [
            ("Error Summary", &self.errors),
            ("Issue Summary", &self.issues),
            ("Information Message Summary", &self.information),
        ] {
            if entries.is_empty() {
                continue;
            }
            out.push_str("\n\n");
            out.push_str(title);
            for entry in entries {
                out.push('\n');
                out.push_str(&entry.to_string());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LedgerEntry {
        LedgerEntry {
            test: "GET Name".into(),
            message: message.into(),
            context: None,
        }
    }

    fn report() -> RunReport {
        RunReport {
            device_type: DeviceType::Focuser,
            device_number: 0,
            url: "http://127.0.0.1:11111".into(),
            started_at: Utc::now(),
            duration_ms: 10,
            interrupted: false,
            errors: vec![],
            issues: vec![],
            information: vec![],
        }
    }

    #[test]
    fn test_clean_run() {
        let report = report();
        assert_eq!(report.verdict(), 0);
        assert!(report.summary().contains("no errors, issues or information"));
        assert_eq!(report.render(), report.summary());
    }

    #[test]
    fn test_counts_are_pluralised() {
        let mut report = report();
        report.errors.push(entry("e"));
        report.issues.push(entry("i1"));
        report.issues.push(entry("i2"));
        assert_eq!(report.summary(), "Found 1 error, 2 issues and 0 information messages.");
        assert_eq!(report.verdict(), 3);

        let rendered = report.render();
        assert!(rendered.contains("Error Summary\nGET Name ==> e"));
        assert!(rendered.contains("Issue Summary\nGET Name ==> i1\nGET Name ==> i2"));
        assert!(!rendered.contains("Information Message Summary"));
    }

    #[test]
    fn test_interrupted_run_keeps_counts() {
        let mut report = report();
        report.interrupted = true;
        report.issues.push(entry("before stop"));
        assert_eq!(report.summary(), "The Alpaca protocol checks were interrupted before completion.");
        assert_eq!(report.verdict(), 1);
    }
}
