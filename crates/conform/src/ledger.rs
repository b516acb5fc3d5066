//! Classified message ledgers and the live status line

use alpaca_conform_common::Outcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Width of the test name column in log lines
pub const TEST_NAME_WIDTH: usize = 35;
/// Width of the outcome column in log lines
pub const OUTCOME_WIDTH: usize = 8;

/// Receiver for the one-line description of current activity
pub trait StatusSink: Send {
    fn set_status(&self, status: &str);
}

/// Default sink that forwards status changes to the debug log
#[derive(Debug, Default)]
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn set_status(&self, status: &str) {
        if !status.is_empty() {
            debug!(status, "status");
        }
    }
}

/// One retained message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub test: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ==> {}", self.test, self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\n  Response: {}", context)?;
        }
        Ok(())
    }
}

/// Errors, issues and information recorded during one run.
///
/// Messages recorded after the run's cancellation token fires are logged
/// but not retained.
pub struct Ledger {
    errors: Vec<LedgerEntry>,
    issues: Vec<LedgerEntry>,
    information: Vec<LedgerEntry>,
    status: Box<dyn StatusSink>,
    show_success_responses: bool,
    cancel: CancellationToken,
}

impl Ledger {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            errors: Vec::new(),
            issues: Vec::new(),
            information: Vec::new(),
            status: Box::new(TracingStatus),
            show_success_responses: false,
            cancel,
        }
    }

    pub fn with_status_sink(mut self, status: Box<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    pub fn show_success_responses(mut self, show: bool) -> Self {
        self.show_success_responses = show;
        self
    }

    pub fn set_status(&self, status: &str) {
        self.status.set_status(status);
    }

    /// Log a classified message and retain it in the matching ledger
    pub fn record(&mut self, test: &str, outcome: Outcome, message: &str, context: Option<&str>) {
        let line = format!(
            "{:<width$}{:<outcome_width$}{}",
            test,
            outcome.to_string(),
            message,
            width = TEST_NAME_WIDTH,
            outcome_width = OUTCOME_WIDTH
        );
        let context = context.filter(|c| !c.is_empty());
        let shown_context = match outcome {
            Outcome::Ok if !self.show_success_responses => None,
            _ => context,
        };

        match outcome {
            Outcome::Ok | Outcome::Info => info!("{}", line),
            Outcome::Issue => warn!("{}", line),
            Outcome::Error => error!("{}", line),
        }
        if let Some(context) = shown_context {
            match outcome {
                Outcome::Issue => warn!("{:width$}  Response: {}", "", context, width = TEST_NAME_WIDTH + OUTCOME_WIDTH),
                Outcome::Error => error!("{:width$}  Response: {}", "", context, width = TEST_NAME_WIDTH + OUTCOME_WIDTH),
                _ => info!("{:width$}  Response: {}", "", context, width = TEST_NAME_WIDTH + OUTCOME_WIDTH),
            }
        }

        if outcome == Outcome::Ok {
            self.status.set_status(&format!("{} - {}", test, message));
            return;
        }

        if self.cancel.is_cancelled() {
            debug!(test, "run cancelled, message not retained");
            return;
        }

        let entry = LedgerEntry {
            test: test.to_string(),
            message: message.to_string(),
            context: context.map(str::to_string),
        };
        match outcome {
            Outcome::Info => self.information.push(entry),
            Outcome::Issue => self.issues.push(entry),
            Outcome::Error => self.errors.push(entry),
            Outcome::Ok => {}
        }
    }

    pub fn ok(&mut self, test: &str, message: &str, context: Option<&str>) {
        self.record(test, Outcome::Ok, message, context);
    }

    pub fn info(&mut self, test: &str, message: &str, context: Option<&str>) {
        self.record(test, Outcome::Info, message, context);
    }

    pub fn issue(&mut self, test: &str, message: &str, context: Option<&str>) {
        self.record(test, Outcome::Issue, message, context);
    }

    pub fn error(&mut self, test: &str, message: &str, context: Option<&str>) {
        self.record(test, Outcome::Error, message, context);
    }

    pub fn errors(&self) -> &[LedgerEntry] {
        &self.errors
    }

    pub fn issues(&self) -> &[LedgerEntry] {
        &self.issues
    }

    pub fn information(&self) -> &[LedgerEntry] {
        &self.information
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drain the ledgers
    pub fn into_entries(self) -> (Vec<LedgerEntry>, Vec<LedgerEntry>, Vec<LedgerEntry>) {
        (self.errors, self.issues, self.information)
    }
}
