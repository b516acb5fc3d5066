//! Classification of one completed HTTP transaction

use alpaca_conform_common::{alpaca_error, ExpectedStatusSet, Outcome, ParsedResponse};
use reqwest::StatusCode;

/// A classified assertion about one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub outcome: Outcome,
    pub message: String,
    pub context: Option<String>,
}

impl Finding {
    fn new(outcome: Outcome, message: String, context: Option<String>) -> Self {
        Self {
            outcome,
            message,
            context,
        }
    }
}

/// Everything known about a transaction once its response has been read
#[derive(Debug, Clone)]
pub struct Evaluation<'a> {
    pub label: &'a str,
    pub status: u16,
    pub expected: &'a ExpectedStatusSet,
    /// Expected round-trip value when a ClientTransactionID parameter was sent
    pub expected_transaction_id: Option<u32>,
    /// Decoded envelope, absent when the body was not decoded
    pub response: Option<&'a ParsedResponse>,
    /// Response text attached to findings
    pub body: &'a str,
    pub badly_cased_transaction_id: bool,
    pub accept_invalid_value: bool,
    pub report_not_implemented: bool,
}

/// `404 (NotFound)` style rendering of a status code
pub fn status_label(status: u16) -> String {
    let name = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(|reason| {
            reason
                .split_whitespace()
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                        None => String::new(),
                    }
                })
                .collect::<String>()
        })
        .unwrap_or_else(|| status.to_string());
    format!("{} ({})", status, name)
}

/// Description of a device-reported error, or None when it is suppressed
pub fn device_error_context(response: &ParsedResponse, report_not_implemented: bool) -> Option<String> {
    if !response.has_error() {
        return None;
    }
    if response.error_number == alpaca_error::NOT_IMPLEMENTED && !report_not_implemented {
        return None;
    }
    let message = match alpaca_error::name(response.error_number) {
        Some(name) => format!(
            "Device returned a {} error (0x{:X}) for client transaction: {}, server transaction: {}. Error message: {}",
            name,
            response.error_number,
            response.client_transaction_id,
            response.server_transaction_id,
            response.error_message
        ),
        None => format!(
            "Device returned error number 0x{:X} for client transaction: {}, server transaction: {}. Error message: {}",
            response.error_number,
            response.client_transaction_id,
            response.server_transaction_id,
            response.error_message
        ),
    };
    Some(message)
}

/// Classify a transaction. Returns the transaction-id findings, if any,
/// followed by exactly one status finding.
pub fn assess(eval: &Evaluation<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    let default_response = ParsedResponse::default();
    let response = eval.response.unwrap_or(&default_response);
    let label = eval.label;
    let body = Some(eval.body.to_string()).filter(|b| !b.is_empty());
    let status_text = status_label(eval.status);
    let is_ok = eval.status == 200;

    if let (Some(expected), true) = (eval.expected_transaction_id, is_ok) {
        let returned = response.client_transaction_id;
        if returned == expected {
            findings.push(Finding::new(
                Outcome::Ok,
                format!("{} - The expected ClientTransactionID was returned: {}", label, returned),
                None,
            ));
        } else if eval.badly_cased_transaction_id && returned == 0 {
            findings.push(Finding::new(
                Outcome::Ok,
                format!(
                    "{} - The ClientTransactionID was round-tripped as expected. Sent value: {}, Returned value: {}",
                    label, expected, returned
                ),
                None,
            ));
        } else {
            findings.push(Finding::new(
                Outcome::Issue,
                format!(
                    "{} - An unexpected ClientTransactionID was returned: {}, Expected: {}",
                    label, returned, expected
                ),
                None,
            ));
        }
    }

    if is_ok {
        let server_id = response.server_transaction_id;
        if server_id >= 1 {
            findings.push(Finding::new(
                Outcome::Ok,
                format!("{} - The ServerTransactionID was 1 or greater: {}", label, server_id),
                None,
            ));
        } else {
            findings.push(Finding::new(
                Outcome::Issue,
                format!(
                    "{} - An unexpected ServerTransactionID was returned: {}, Expected: 1 or greater",
                    label, server_id
                ),
                None,
            ));
        }
    }

    let error_context = device_error_context(response, eval.report_not_implemented);

    let status_finding = if eval.expected.is_any() {
        Finding::new(
            Outcome::Info,
            format!("{} - Received HTTP status {}", label, status_text),
            body,
        )
    } else if eval.expected.contains(eval.status) {
        match (is_ok, error_context) {
            (true, Some(context)) => Finding::new(
                Outcome::Info,
                format!(
                    "{} - Received HTTP status {} as expected but the device reported an Alpaca error:",
                    label, status_text
                ),
                Some(context),
            ),
            _ => Finding::new(
                Outcome::Ok,
                format!("{} - Received HTTP status {} as expected.", label, status_text),
                body,
            ),
        }
    } else if is_ok && eval.accept_invalid_value && response.error_number == alpaca_error::INVALID_VALUE {
        Finding::new(
            Outcome::Ok,
            format!(
                "{} - Received HTTP status {} and an invalid value error: {}",
                label, status_text, response.error_message
            ),
            body,
        )
    } else {
        let expected_list: Vec<String> = eval.expected.codes().iter().map(|c| status_label(*c)).collect();
        let plural = if expected_list.len() > 1 { "es" } else { "" };
        Finding::new(
            Outcome::Issue,
            format!(
                "{} - Expected HTTP status{}: {} but received status: {}.",
                label,
                plural,
                expected_list.join(", "),
                status_text
            ),
            body,
        )
    };
    findings.push(status_finding);
    findings
}
