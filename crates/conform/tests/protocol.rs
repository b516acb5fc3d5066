//! End-to-end protocol checks against a simulated Alpaca device

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use alpaca_conform::executor::{CallOptions, CallReport, TransactionExecutor};
use alpaca_conform::ledger::Ledger;
use alpaca_conform::variants::standard_parameters;
use alpaca_conform::{ConformConfig, ProtocolRunner};
use alpaca_conform_common::{DeviceType, ExpectedStatusSet, HttpVerb, Parameter};

#[derive(Debug, Clone, Copy)]
enum Kind {
    Bool,
    Number,
}

#[derive(Debug, Clone)]
struct Member {
    value: Value,
    parameters: Vec<(&'static str, Kind)>,
}

/// A well-behaved Alpaca device answering every request it understands
#[derive(Clone)]
struct SimulatedDevice {
    device_type: DeviceType,
    device_number: u32,
    gets: HashMap<String, Member>,
    puts: HashMap<String, Member>,
    server_transaction: Arc<AtomicU32>,
    echo_transaction_id: bool,
    delay: Option<Duration>,
}

impl SimulatedDevice {
    fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            device_number: 0,
            gets: HashMap::new(),
            puts: HashMap::new(),
            server_transaction: Arc::new(AtomicU32::new(1)),
            echo_transaction_id: true,
            delay: None,
        }
        .get("Connected", json!(true))
        .get("Description", json!("Simulated device"))
        .get("DriverInfo", json!("Simulator"))
        .get("DriverVersion", json!("1.0"))
        .get("InterfaceVersion", json!(3))
        .get("Name", json!("Simulator"))
        .get("SupportedActions", json!([]))
        .put("Connected", &[("Connected", Kind::Bool)])
    }

    fn get(self, member: &str, value: Value) -> Self {
        self.get_with(member, value, &[])
    }

    fn get_with(mut self, member: &str, value: Value, parameters: &[(&'static str, Kind)]) -> Self {
        self.gets.insert(
            member.to_lowercase(),
            Member {
                value,
                parameters: parameters.to_vec(),
            },
        );
        self
    }

    fn put(mut self, member: &str, parameters: &[(&'static str, Kind)]) -> Self {
        self.puts.insert(
            member.to_lowercase(),
            Member {
                value: Value::Null,
                parameters: parameters.to_vec(),
            },
        );
        self
    }

    fn focuser() -> Self {
        Self::new(DeviceType::Focuser)
            .get("Absolute", json!(true))
            .get("IsMoving", json!(false))
            .get("MaxIncrement", json!(1000))
            .get("MaxStep", json!(50000))
            .get("Position", json!(1234))
            .get("StepSize", json!(1.5))
            .get("TempComp", json!(false))
            .get("TempCompAvailable", json!(true))
            .get("Temperature", json!(12.5))
            .put("TempComp", &[("TempComp", Kind::Bool)])
            .put("Halt", &[])
            .put("Move", &[("Position", Kind::Number)])
    }

    fn handle(&self, request: &Request) -> ResponseTemplate {
        let bad = |message: &str| ResponseTemplate::new(400).set_body_string(message.to_string());
        let segments: Vec<&str> = request.url.path().split('/').collect();
        if segments.len() != 6 || segments[1] != "api" || segments[2] != "v1" {
            return ResponseTemplate::new(404).set_body_string("not found");
        }
        if segments[3] != self.device_type.api_name() {
            return bad("unknown device type");
        }
        match segments[4].parse::<u32>() {
            Ok(number) if number == self.device_number => {}
            _ => return bad("unknown device number"),
        }

        let get = request.method.as_str() == "GET";
        let (members, parameters) = match request.method.as_str() {
            "GET" => (
                &self.gets,
                request
                    .url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect::<Vec<_>>(),
            ),
            "PUT" => (&self.puts, parse_form(&request.body)),
            _ => return ResponseTemplate::new(405).set_body_string("method not allowed"),
        };
        let Some(member) = members.get(segments[5]) else {
            return bad("unknown member");
        };

        if let Some(value) = lookup(&parameters, "ClientID", get) {
            if value.parse::<u32>().is_err() {
                return bad("invalid ClientID");
            }
        }
        let mut transaction_id = 0;
        if let Some(value) = lookup(&parameters, "ClientTransactionID", get) {
            match value.parse::<u32>() {
                Ok(id) => transaction_id = id,
                Err(_) => return bad("invalid ClientTransactionID"),
            }
        }
        for (name, kind) in &member.parameters {
            match lookup(&parameters, name, get) {
                Some(value) if valid(*kind, value) => {}
                _ => return bad(&format!("missing or invalid {}", name)),
            }
        }

        let server_transaction = self.server_transaction.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_json(json!({
            "Value": member.value,
            "ClientTransactionID": if self.echo_transaction_id { transaction_id } else { 0 },
            "ServerTransactionID": server_transaction,
            "ErrorNumber": 0,
            "ErrorMessage": "",
        }))
    }
}

impl Respond for SimulatedDevice {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let response = self.handle(request);
        match self.delay {
            Some(delay) => response.set_delay(delay),
            None => response,
        }
    }
}

fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                urlencoding::decode(&s.replace('+', " "))
                    .map(|d| d.into_owned())
                    .unwrap_or_default()
            };
            (decode(name), decode(value))
        })
        .collect()
}

fn lookup<'a>(parameters: &'a [(String, String)], name: &str, case_insensitive: bool) -> Option<&'a str> {
    parameters
        .iter()
        .find(|(n, _)| if case_insensitive { n.eq_ignore_ascii_case(name) } else { n == name })
        .map(|(_, v)| v.as_str())
}

fn valid(kind: Kind, value: &str) -> bool {
    match kind {
        Kind::Bool => value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"),
        Kind::Number => value.trim().parse::<f64>().is_ok(),
    }
}

async fn serve(device: SimulatedDevice) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(any()).respond_with(device).mount(&server).await;
    server
}

fn config_for(server: &MockServer, device_type: DeviceType) -> ConformConfig {
    let mut config = ConformConfig::default();
    config.device.host = server.address().ip().to_string();
    config.device.port = server.address().port();
    config.device.device_type = device_type;
    config
}

fn image_bytes_frame(version: i32, error_number: i32, ctid: u32, stid: u32, tail: &[u8]) -> Vec<u8> {
    let fields: [i32; 11] = [version, error_number, ctid as i32, stid as i32, 44, 2, 2, 2, 2, 2, 0];
    let mut frame: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
    frame.extend_from_slice(tail);
    frame
}

fn single(executor: &TransactionExecutor, member: &str, label: &str) -> alpaca_conform::Transaction {
    executor.transaction(HttpVerb::Get, member, label, standard_parameters(), ExpectedStatusSet::ok())
}

#[tokio::test]
async fn test_conformant_safety_monitor_passes() {
    let server = serve(SimulatedDevice::new(DeviceType::SafetyMonitor).get("IsSafe", json!(true))).await;
    let config = config_for(&server, DeviceType::SafetyMonitor);

    let report = ProtocolRunner::new(config, CancellationToken::new()).run().await;

    assert_eq!(report.verdict(), 0, "{}", report.render());
    assert!(report.is_clean(), "{}", report.render());
    assert!(!report.interrupted);
    assert!(report.summary().starts_with("Congratulations"));
}

#[tokio::test]
async fn test_conformant_focuser_passes() {
    let server = serve(SimulatedDevice::focuser()).await;
    let config = config_for(&server, DeviceType::Focuser);

    let report = ProtocolRunner::new(config, CancellationToken::new()).run().await;

    assert_eq!(report.verdict(), 0, "{}", report.render());
    assert!(report.is_clean(), "{}", report.render());

    let requests = server.received_requests().await.unwrap();
    let moves = requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT" && r.url.path() == "/api/v1/focuser/0/move")
        .count();
    // Fourteen variants for a one-parameter PUT
    assert_eq!(moves, 14);
    let first_move = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/focuser/0/move")
        .unwrap();
    assert!(String::from_utf8_lossy(&first_move.body).contains("Position=1234"));
}

#[tokio::test]
async fn test_missing_transaction_id_echo_is_an_issue() {
    let mut device = SimulatedDevice::new(DeviceType::SafetyMonitor).get("IsSafe", json!(true));
    device.echo_transaction_id = false;
    let server = serve(device).await;
    let config = config_for(&server, DeviceType::SafetyMonitor);

    let report = ProtocolRunner::new(config, CancellationToken::new()).run().await;

    assert!(report.verdict() > 0);
    assert!(report.errors.is_empty());
    assert!(report
        .issues
        .iter()
        .any(|i| i.message.ends_with("An unexpected ClientTransactionID was returned: 0, Expected: 67890")));
    // Mis-cased PUT transaction ids may legitimately come back as zero
    assert!(!report
        .issues
        .iter()
        .any(|i| i.message.starts_with("Bad ClientTransactionID casing")));
}

#[tokio::test]
async fn test_disabled_gates_are_reported_as_omitted() {
    let server = serve(
        SimulatedDevice::new(DeviceType::Switch)
            .get("MaxSwitch", json!(2))
            .get_with("CanWrite", json!(true), &[("Id", Kind::Number)])
            .get_with("GetSwitch", json!(false), &[("Id", Kind::Number)])
            .get_with("GetSwitchDescription", json!("Relay"), &[("Id", Kind::Number)])
            .get_with("GetSwitchName", json!("Relay 0"), &[("Id", Kind::Number)])
            .get_with("GetSwitchValue", json!(0.0), &[("Id", Kind::Number)])
            .get_with("MinSwitchValue", json!(0.0), &[("Id", Kind::Number)])
            .get_with("MaxSwitchValue", json!(1.0), &[("Id", Kind::Number)])
            .get_with("SwitchStep", json!(1.0), &[("Id", Kind::Number)]),
    )
    .await;
    let mut config = config_for(&server, DeviceType::Switch);
    config.switch.read_delay_ms = 0;

    let report = ProtocolRunner::new(config, CancellationToken::new()).run().await;

    assert_eq!(report.verdict(), 0, "{}", report.render());
    let omitted: Vec<&str> = report.information.iter().map(|i| i.test.as_str()).collect();
    assert_eq!(omitted, ["PUT SetSwitch", "PUT SetSwitchName", "PUT SetSwitchValue"]);
    assert!(report
        .information
        .iter()
        .all(|i| i.message == "Test omitted due to configuration setting"));
}

#[tokio::test]
async fn test_wait_timeout_stops_device_plan() {
    let server = serve(SimulatedDevice::focuser().get("IsMoving", json!(true))).await;
    let mut config = config_for(&server, DeviceType::Focuser);
    config.alpaca.standard_response_timeout = 1;

    let report = ProtocolRunner::new(config, CancellationToken::new()).run().await;

    assert_eq!(report.issues.len(), 1, "{}", report.render());
    assert_eq!(report.issues[0].test, "WaitUntil");
    assert_eq!(report.issues[0].message, "The Halt operation timed out after 1 seconds.");
    assert!(report.errors.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert!(!requests.iter().any(|r| r.url.path() == "/api/v1/focuser/0/move"));
    let last = requests.last().unwrap();
    assert_eq!(last.url.path(), "/api/v1/focuser/0/connected");
    assert!(String::from_utf8_lossy(&last.body).contains("Connected=False"));
}

#[tokio::test]
async fn test_cancellation_interrupts_run_and_still_disconnects() {
    let mut device = SimulatedDevice::focuser();
    device.delay = Some(Duration::from_millis(100));
    let server = serve(device).await;
    let config = config_for(&server, DeviceType::Focuser);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(750)).await;
        trigger.cancel();
    });

    let report = ProtocolRunner::new(config, cancel).run().await;

    assert!(report.interrupted);
    assert_eq!(report.summary(), "The Alpaca protocol checks were interrupted before completion.");
    assert!(report.errors.is_empty(), "{}", report.render());

    let requests = server.received_requests().await.unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.method.as_str(), "PUT");
    assert_eq!(last.url.path(), "/api/v1/focuser/0/connected");
    assert!(String::from_utf8_lossy(&last.body).contains("Connected=False"));
}

#[tokio::test]
async fn test_broken_plan_directory_is_reported_without_requests() {
    let server = serve(SimulatedDevice::focuser()).await;
    let config = config_for(&server, DeviceType::Focuser);
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.yaml"), "steps: [unterminated").unwrap();

    let report = ProtocolRunner::new(config, CancellationToken::new())
        .with_plans_dir(dir.path())
        .run()
        .await;

    assert_eq!(report.errors.len(), 1, "{}", report.render());
    assert_eq!(report.errors[0].test, "ConformanceCheck");
    assert!(report.errors[0].message.contains("broken.yaml"));
    assert_eq!(report.verdict(), 1);
    assert!(!report.interrupted);
    assert!(report.url.ends_with("/api/v1/focuser/0"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unexpected_status_is_one_issue() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404).set_body_string("no such member"))
        .mount(&server)
        .await;
    let config = config_for(&server, DeviceType::Camera);
    let executor = TransactionExecutor::new(&config, CancellationToken::new()).unwrap();
    let mut ledger = Ledger::new(CancellationToken::new());

    let tx = single(&executor, "Gain", "Good");
    let report = executor.execute(&mut ledger, &tx, CallOptions::default()).await;

    assert_eq!(report, CallReport::Completed { status: 404, response: None });
    assert_eq!(ledger.issues().len(), 1);
    assert_eq!(
        ledger.issues()[0].message,
        "Good - Expected HTTP status: 200 (OK) but received status: 404 (NotFound)."
    );
    assert_eq!(ledger.issues()[0].context.as_deref(), Some("no such member"));
}

#[tokio::test]
async fn test_undecodable_success_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_string("this is not json"))
        .mount(&server)
        .await;
    let config = config_for(&server, DeviceType::Camera);
    let executor = TransactionExecutor::new(&config, CancellationToken::new()).unwrap();
    let mut ledger = Ledger::new(CancellationToken::new());

    let tx = single(&executor, "Gain", "Good");
    let report = executor.execute(&mut ledger, &tx, CallOptions::default()).await;

    assert_eq!(report, CallReport::Failed);
    assert_eq!(ledger.errors().len(), 1);
    assert!(ledger.errors()[0]
        .message
        .starts_with("Good - Received HTTP status 200 (OK) but could not de-serialise"));
    assert!(ledger.issues().is_empty());
}

#[tokio::test]
async fn test_image_bytes_response_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(image_bytes_frame(1, 0, 67890, 7, &[0u8; 16]), "application/imagebytes"),
        )
        .mount(&server)
        .await;
    let config = config_for(&server, DeviceType::Camera);
    let executor = TransactionExecutor::new(&config, CancellationToken::new()).unwrap();
    let mut ledger = Ledger::new(CancellationToken::new());

    let tx = single(&executor, "ImageArray", "Good");
    let options = CallOptions {
        large_array: true,
        ..CallOptions::default()
    };
    let report = executor.execute(&mut ledger, &tx, options).await;

    match report {
        CallReport::Completed {
            status: 200,
            response: Some(response),
        } => {
            assert_eq!(response.client_transaction_id, 67890);
            assert_eq!(response.server_transaction_id, 7);
        }
        other => panic!("unexpected report {:?}", other),
    }
    assert!(ledger.issues().is_empty());
    assert!(ledger.errors().is_empty());

    let requests = server.received_requests().await.unwrap();
    let headers = &requests[0].headers;
    assert_eq!(headers.get("base64handoff").unwrap(), "true");
    assert!(headers
        .get("accept")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("application/imagebytes"));
}

#[tokio::test]
async fn test_unknown_image_bytes_version_is_an_issue() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(image_bytes_frame(2, 0, 67890, 7, &[]), "application/imagebytes"),
        )
        .mount(&server)
        .await;
    let config = config_for(&server, DeviceType::Camera);
    let executor = TransactionExecutor::new(&config, CancellationToken::new()).unwrap();
    let mut ledger = Ledger::new(CancellationToken::new());

    let tx = single(&executor, "ImageArray", "Good");
    let report = executor.execute(&mut ledger, &tx, CallOptions::default()).await;

    assert!(matches!(report, CallReport::Completed { status: 200, .. }));
    assert_eq!(ledger.issues().len(), 1);
    assert_eq!(
        ledger.issues()[0].message,
        "Good - An unexpected ImageBytes metadata version was returned: 2, Expected: 1"
    );
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    let mut config = config_for(&server, DeviceType::Camera);
    config.alpaca.long_response_timeout = 1;
    let executor = TransactionExecutor::new(&config, CancellationToken::new()).unwrap();
    let mut ledger = Ledger::new(CancellationToken::new());

    let tx = single(&executor, "Gain", "Slow");
    let report = executor.execute(&mut ledger, &tx, CallOptions::default()).await;

    assert_eq!(report, CallReport::Failed);
    assert_eq!(ledger.errors()[0].message, "Slow - The request timed out after 1.0 seconds");
}

#[tokio::test]
async fn test_cancelled_run_skips_requests_unless_ignored() {
    let server = serve(SimulatedDevice::focuser()).await;
    let config = config_for(&server, DeviceType::Focuser);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let executor = TransactionExecutor::new(&config, cancel.clone()).unwrap();
    let mut ledger = Ledger::new(cancel);

    let tx = single(&executor, "Position", "Good");
    assert_eq!(
        executor.execute(&mut ledger, &tx, CallOptions::default()).await,
        CallReport::Skipped
    );

    let mut parameters = standard_parameters();
    parameters.push(Parameter::new("Connected", "False"));
    let disconnect = executor.transaction(HttpVerb::Put, "Connected", "False", parameters, ExpectedStatusSet::ok());
    let options = CallOptions {
        ignore_cancellation: true,
        ..CallOptions::default()
    };
    let report = executor.execute(&mut ledger, &disconnect, options).await;
    assert!(matches!(report, CallReport::Completed { status: 200, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_basic_auth_sent_when_configured() {
    let server = serve(SimulatedDevice::focuser()).await;
    let mut config = config_for(&server, DeviceType::Focuser);
    config.alpaca.username = Some("user".into());
    config.alpaca.password = Some("pass".into());
    let executor = TransactionExecutor::new(&config, CancellationToken::new()).unwrap();
    let mut ledger = Ledger::new(CancellationToken::new());

    let tx = single(&executor, "Position", "Good");
    executor.execute(&mut ledger, &tx, CallOptions::default()).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].headers.get("authorization").unwrap(), "Basic dXNlcjpwYXNz");
    assert!(requests[0]
        .headers
        .get("user-agent")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("AlpacaConform/"));
}
