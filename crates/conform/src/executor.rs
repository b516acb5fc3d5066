//! Transaction executor
//!
//! Sends one request to the device under the run's cancellation and timeout
//! discipline, decodes the JSON or ImageBytes envelope and records every
//! resulting assertion in the ledger. Transport failures are recorded and
//! reported back to the caller, they never abort the run.

use std::future::Future;
use std::time::Duration;

use alpaca_conform_common::image_bytes::SUPPORTED_METADATA_VERSION;
use alpaca_conform_common::{
    device_member_path, user_agent, DeviceType, ExpectedStatusSet, HttpVerb, ImageBytesFrame,
    Parameter, ParsedResponse, APPLICATION_JSON_MIME_TYPE, BASE64_HANDOFF_HEADER,
    BASE64_HANDOFF_SUPPORTED, CLIENT_TRANSACTION_ID, IMAGE_BYTES_MIME_TYPE,
};
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{ConformConfig, ImageArrayTransfer};
use crate::error::{ConformError, ConformResult};
use crate::ledger::Ledger;
use crate::verdict::{assess, status_label, Evaluation};

/// Longest response text attached to a ledger entry
pub const MAX_CONTEXT_CHARS: usize = 4096;

/// Why a bounded call did not produce a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    TimedOut(Duration),
}

impl From<Interruption> for ConformError {
    fn from(interruption: Interruption) -> Self {
        match interruption {
            Interruption::Cancelled => ConformError::Cancelled,
            Interruption::TimedOut(after) => ConformError::RequestTimeout(after.as_secs_f64()),
        }
    }
}

/// Run-level cancellation combined with a per-request timeout
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Duration,
}

impl CallContext {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` until it completes, the timeout elapses or, unless
    /// `ignore_cancellation` is set, the run is cancelled.
    pub async fn run<F, T>(&self, fut: F, ignore_cancellation: bool) -> Result<T, Interruption>
    where
        F: Future<Output = T>,
    {
        let bounded = tokio::time::timeout(self.timeout, fut);
        if ignore_cancellation {
            return bounded.await.map_err(|_| Interruption::TimedOut(self.timeout));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interruption::Cancelled),
            result = bounded => result.map_err(|_| Interruption::TimedOut(self.timeout)),
        }
    }
}

/// A request as the device sent it back
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_image_bytes(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains(IMAGE_BYTES_MIME_TYPE))
            .unwrap_or(false)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One request to classify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// `{VERB} {Member}` name the findings are recorded under
    pub test_name: String,
    pub label: String,
    pub path: String,
    pub verb: HttpVerb,
    pub parameters: Vec<Parameter>,
    pub expected: ExpectedStatusSet,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Send even after the run is cancelled, e.g. the final disconnect
    pub ignore_cancellation: bool,
    pub badly_cased_transaction_id: bool,
    pub accept_invalid_value: bool,
    /// Add the image array transfer headers
    pub large_array: bool,
}

/// What became of one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReport {
    /// Not sent because the run was already cancelled
    Skipped,
    /// Transport failure, cancellation, timeout or an undecodable body
    Failed,
    Completed {
        status: u16,
        response: Option<ParsedResponse>,
    },
}

impl CallReport {
    pub fn was_sent(&self) -> bool {
        !matches!(self, CallReport::Skipped)
    }
}

/// The round-trip value a device should echo for the ClientTransactionID
/// parameter in `parameters`, if one is present under any casing.
///
/// GET query names are matched case-insensitively by devices so the raw value
/// is always expected back. A form parameter whose name is not exactly cased
/// may be dropped, so zero is expected instead.
pub fn expected_transaction_id(verb: HttpVerb, parameters: &[Parameter]) -> Option<u32> {
    let mut expected = None;
    for parameter in parameters {
        if parameter.name.eq_ignore_ascii_case(CLIENT_TRANSACTION_ID) {
            let parsed = parameter.value.trim().parse::<u32>().unwrap_or(0);
            let value = if verb.is_get() || parameter.name == CLIENT_TRANSACTION_ID {
                parsed
            } else {
                0
            };
            debug!(name = %parameter.name, raw = %parameter.value, expected = value, "transaction id");
            expected = Some(value);
        }
    }
    expected
}

/// Cut `text` down to `MAX_CONTEXT_CHARS` characters
pub fn truncate_context(text: &str) -> String {
    match text.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

fn method(verb: HttpVerb) -> Method {
    match verb {
        HttpVerb::Get => Method::GET,
        HttpVerb::Put => Method::PUT,
        HttpVerb::Post => Method::POST,
        HttpVerb::Delete => Method::DELETE,
    }
}

fn query_string(parameters: &[Parameter]) -> String {
    parameters
        .iter()
        .map(|p| format!("{}={}", urlencoding::encode(&p.name), urlencoding::encode(&p.value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sends transactions to one device
pub struct TransactionExecutor {
    client: Client,
    base_url: String,
    device_type: DeviceType,
    device_number: u32,
    transfer: ImageArrayTransfer,
    report_not_implemented: bool,
    context: CallContext,
}

impl TransactionExecutor {
    pub fn new(config: &ConformConfig, cancel: CancellationToken) -> ConformResult<Self> {
        let alpaca = &config.alpaca;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON_MIME_TYPE));
        if let Some((user, password)) = alpaca.credentials() {
            let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
            let mut value = HeaderValue::from_str(&format!("Basic {}", token))
                .map_err(|e| ConformError::Config(format!("invalid credentials: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(user_agent())
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(alpaca.establish_connection_timeout))
            .gzip(alpaca.image_array_compression.gzip())
            .deflate(alpaca.image_array_compression.deflate())
            .danger_accept_invalid_certs(alpaca.trust_user_certificates)
            .build()?;

        Ok(Self {
            client,
            base_url: config.device.base_url(),
            device_type: config.device.device_type,
            device_number: config.device.device_number,
            transfer: alpaca.image_array_transfer,
            report_not_implemented: alpaca.report_not_implemented_errors,
            context: CallContext::new(cancel, alpaca.request_timeout()),
        })
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn device_number(&self) -> u32 {
        self.device_number
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `/api/v1/{type}/{number}/{member}` for this device
    pub fn member_path(&self, member: &str) -> String {
        device_member_path(self.device_type, self.device_number, member)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Transaction against a named member of this device
    pub fn transaction(
        &self,
        verb: HttpVerb,
        member: &str,
        label: impl Into<String>,
        parameters: Vec<Parameter>,
        expected: ExpectedStatusSet,
    ) -> Transaction {
        Transaction {
            test_name: format!("{} {}", verb, member),
            label: label.into(),
            path: self.member_path(member),
            verb,
            parameters,
            expected,
        }
    }

    /// Send one request and read the whole body within the call context
    pub async fn send(
        &self,
        verb: HttpVerb,
        path: &str,
        parameters: &[Parameter],
        large_array: bool,
        ignore_cancellation: bool,
    ) -> ConformResult<RawResponse> {
        let url = self.url(path);
        let mut request = if verb.is_get() && !parameters.is_empty() {
            self.client
                .request(method(verb), format!("{}?{}", url, query_string(parameters)))
        } else if verb.is_get() {
            self.client.request(method(verb), url)
        } else {
            let form: Vec<(&str, &str)> = parameters
                .iter()
                .map(|p| (p.name.as_str(), p.value.as_str()))
                .collect();
            self.client.request(method(verb), url).form(&form)
        };

        if large_array {
            if self.transfer.accepts_image_bytes() {
                request = request.header(
                    ACCEPT,
                    format!("{}, {}", APPLICATION_JSON_MIME_TYPE, IMAGE_BYTES_MIME_TYPE),
                );
            }
            if self.transfer.requests_base64_handoff() {
                request = request.header(BASE64_HANDOFF_HEADER, BASE64_HANDOFF_SUPPORTED);
            }
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(RawResponse {
                status,
                content_type,
                body,
            })
        };

        let raw = self.context.run(exchange, ignore_cancellation).await??;
        Ok(raw)
    }

    /// Execute a transaction and record its findings
    pub async fn execute(&self, ledger: &mut Ledger, transaction: &Transaction, options: CallOptions) -> CallReport {
        let test = transaction.test_name.as_str();
        let label = transaction.label.as_str();

        if !options.ignore_cancellation && self.context.is_cancelled() {
            debug!(test, label, "run cancelled, request not sent");
            return CallReport::Skipped;
        }

        let expected_id = expected_transaction_id(transaction.verb, &transaction.parameters);
        debug!(
            test,
            label,
            verb = %transaction.verb,
            path = %transaction.path,
            parameters = transaction.parameters.len(),
            "sending request"
        );

        let raw = match self
            .send(
                transaction.verb,
                &transaction.path,
                &transaction.parameters,
                options.large_array,
                options.ignore_cancellation,
            )
            .await
        {
            Ok(raw) => raw,
            Err(ConformError::Cancelled) => {
                ledger.error(test, &format!("{} - The HTTP request was cancelled", label), None);
                return CallReport::Failed;
            }
            Err(e) => {
                ledger.error(test, &format!("{} - {}", label, e), None);
                return CallReport::Failed;
            }
        };

        let image_bytes = raw.is_image_bytes();
        let mut text = if image_bytes { String::new() } else { raw.text() };
        let mut response = None;

        if raw.status == 200 && !text.contains("<!DOCTYPE") {
            if image_bytes {
                match ImageBytesFrame::metadata_version(&raw.body) {
                    Ok(version) if version == SUPPORTED_METADATA_VERSION => {
                        ledger.ok(
                            test,
                            &format!("{} - The expected ImageBytes metadata version was returned: {}", label, version),
                            None,
                        );
                    }
                    Ok(version) => {
                        ledger.issue(
                            test,
                            &format!(
                                "{} - An unexpected ImageBytes metadata version was returned: {}, Expected: 1",
                                label, version
                            ),
                            None,
                        );
                    }
                    Err(_) => {}
                }
                match ImageBytesFrame::decode(&raw.body) {
                    Ok(frame) => {
                        text = frame.summary();
                        response = Some(frame.envelope());
                    }
                    Err(e) => {
                        ledger.error(
                            test,
                            &format!(
                                "{} - Received HTTP status {} but could not decode the ImageBytes response: {}",
                                label,
                                status_label(raw.status),
                                e
                            ),
                            None,
                        );
                        return CallReport::Failed;
                    }
                }
            } else {
                match ParsedResponse::from_json(&text) {
                    Ok(parsed) => response = Some(parsed),
                    Err(e) => {
                        ledger.error(
                            test,
                            &format!(
                                "{} - Received HTTP status {} but could not de-serialise the returned JSON string. Exception message: {}",
                                label,
                                status_label(raw.status),
                                e
                            ),
                            Some(&truncate_context(&text)),
                        );
                        return CallReport::Failed;
                    }
                }
            }
        }

        let context = truncate_context(&text);
        let evaluation = Evaluation {
            label,
            status: raw.status,
            expected: &transaction.expected,
            expected_transaction_id: expected_id,
            response: response.as_ref(),
            body: &context,
            badly_cased_transaction_id: options.badly_cased_transaction_id,
            accept_invalid_value: options.accept_invalid_value,
            report_not_implemented: self.report_not_implemented,
        };
        for finding in assess(&evaluation) {
            ledger.record(test, finding.outcome, &finding.message, finding.context.as_deref());
        }

        CallReport::Completed {
            status: raw.status,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn parameter(name: &str, value: &str) -> Vec<Parameter> {
        vec![Parameter::new("ClientID", "1"), Parameter::new(name, value)]
    }

    #[test_case(HttpVerb::Get, "ClientTransactionID", "67890", Some(67890))]
    #[test_case(HttpVerb::Get, "clienttransactionid", "67890", Some(67890))]
    #[test_case(HttpVerb::Put, "ClientTransactionID", "67890", Some(67890))]
    #[test_case(HttpVerb::Put, "clienttransactionid", "67890", Some(0))]
    #[test_case(HttpVerb::Get, "ClientTransactionID", "-67890", Some(0))]
    #[test_case(HttpVerb::Get, "ClientTransactionID", "     ", Some(0))]
    #[test_case(HttpVerb::Get, "Other", "1", None)]
    fn test_expected_transaction_id(verb: HttpVerb, name: &str, value: &str, expected: Option<u32>) {
        assert_eq!(expected_transaction_id(verb, &parameter(name, value)), expected);
    }

    #[test]
    fn test_query_string_is_encoded_in_order() {
        let parameters = vec![
            Parameter::new("ClientID", "     "),
            Parameter::new("Name", "a&b"),
        ];
        assert_eq!(query_string(&parameters), "ClientID=%20%20%20%20%20&Name=a%26b");
    }

    #[test]
    fn test_truncate_context() {
        let long = "x".repeat(MAX_CONTEXT_CHARS + 10);
        let cut = truncate_context(&long);
        assert_eq!(cut.chars().count(), MAX_CONTEXT_CHARS + 3);
        assert_eq!(truncate_context("short"), "short");
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_context_times_out() {
        let context = CallContext::new(CancellationToken::new(), Duration::from_secs(2));
        let result = context
            .run(tokio::time::sleep(Duration::from_secs(5)), false)
            .await;
        assert_eq!(result, Err(Interruption::TimedOut(Duration::from_secs(2))));
    }

    #[tokio::test]
    async fn test_call_context_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let context = CallContext::new(cancel, Duration::from_secs(2));
        assert_eq!(context.run(async { 1 }, false).await, Err(Interruption::Cancelled));
        assert_eq!(context.run(async { 1 }, true).await, Ok(1));
    }

    #[test]
    fn test_transaction_name_and_path() {
        let mut config = ConformConfig::default();
        config.device.device_type = DeviceType::Focuser;
        config.device.device_number = 3;
        let executor = TransactionExecutor::new(&config, CancellationToken::new()).unwrap();
        let tx = executor.transaction(HttpVerb::Put, "TempComp", "Good", vec![], ExpectedStatusSet::ok());
        assert_eq!(tx.test_name, "PUT TempComp");
        assert_eq!(tx.path, "/api/v1/focuser/3/tempcomp");
        assert_eq!(executor.url(&tx.path), "http://127.0.0.1:11111/api/v1/focuser/3/tempcomp");
    }
}
