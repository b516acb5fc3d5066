//! Core types for Alpaca conformance checking

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One request parameter, sent in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// HTTP method used for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpVerb {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Put => "PUT",
            HttpVerb::Post => "POST",
            HttpVerb::Delete => "DELETE",
        }
    }

    pub fn is_get(&self) -> bool {
        matches!(self, HttpVerb::Get)
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acceptable HTTP status codes for a call. Empty means any status is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedStatusSet(Vec<u16>);

/// Client error codes accepted as a correct rejection of a malformed URL
pub const CLIENT_ERROR_CODES: [u16; 10] = [400, 401, 402, 403, 404, 405, 406, 407, 409, 410];

impl ExpectedStatusSet {
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        let mut set: Vec<u16> = Vec::new();
        for code in codes {
            if !set.contains(&code) {
                set.push(code);
            }
        }
        Self(set)
    }

    pub fn any() -> Self {
        Self(Vec::new())
    }

    pub fn ok() -> Self {
        Self(vec![200])
    }

    pub fn bad_request() -> Self {
        Self(vec![400])
    }

    pub fn client_error() -> Self {
        Self::new(CLIENT_ERROR_CODES)
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the set is exactly `{200}`
    pub fn is_ok_only(&self) -> bool {
        self.0 == [200]
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.contains(&status)
    }

    pub fn codes(&self) -> &[u16] {
        &self.0
    }
}

/// Logical response envelope, whichever wire encoding carried it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    #[serde(rename = "ClientTransactionID", default)]
    pub client_transaction_id: u32,
    #[serde(rename = "ServerTransactionID", default)]
    pub server_transaction_id: u32,
    #[serde(rename = "ErrorNumber", default)]
    pub error_number: i32,
    #[serde(rename = "ErrorMessage", default, deserialize_with = "null_as_empty")]
    pub error_message: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ParsedResponse {
    /// Decode the envelope fields of a JSON response body
    pub fn from_json(body: &str) -> crate::Result<Self> {
        serde_json::from_str(body).map_err(Error::from)
    }

    pub fn has_error(&self) -> bool {
        self.error_number != 0 || !self.error_message.is_empty()
    }
}

/// Severity of one classified assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Info,
    Issue,
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "OK"),
            Outcome::Info => write!(f, "INFO"),
            Outcome::Issue => write!(f, "ISSUE"),
            Outcome::Error => write!(f, "ERROR"),
        }
    }
}

/// Alpaca device types that have a protocol test plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Camera,
    CoverCalibrator,
    Dome,
    FilterWheel,
    Focuser,
    ObservingConditions,
    Rotator,
    SafetyMonitor,
    Switch,
    Telescope,
}

impl DeviceType {
    pub const ALL: [DeviceType; 10] = [
        DeviceType::Camera,
        DeviceType::CoverCalibrator,
        DeviceType::Dome,
        DeviceType::FilterWheel,
        DeviceType::Focuser,
        DeviceType::ObservingConditions,
        DeviceType::Rotator,
        DeviceType::SafetyMonitor,
        DeviceType::Switch,
        DeviceType::Telescope,
    ];

    /// Name as written in the device type element of an Alpaca URL
    pub fn api_name(&self) -> &'static str {
        match self {
            DeviceType::Camera => "camera",
            DeviceType::CoverCalibrator => "covercalibrator",
            DeviceType::Dome => "dome",
            DeviceType::FilterWheel => "filterwheel",
            DeviceType::Focuser => "focuser",
            DeviceType::ObservingConditions => "observingconditions",
            DeviceType::Rotator => "rotator",
            DeviceType::SafetyMonitor => "safetymonitor",
            DeviceType::Switch => "switch",
            DeviceType::Telescope => "telescope",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Camera => "Camera",
            DeviceType::CoverCalibrator => "CoverCalibrator",
            DeviceType::Dome => "Dome",
            DeviceType::FilterWheel => "FilterWheel",
            DeviceType::Focuser => "Focuser",
            DeviceType::ObservingConditions => "ObservingConditions",
            DeviceType::Rotator => "Rotator",
            DeviceType::SafetyMonitor => "SafetyMonitor",
            DeviceType::Switch => "Switch",
            DeviceType::Telescope => "Telescope",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DeviceType::ALL
            .into_iter()
            .find(|t| t.api_name() == wanted)
            .ok_or_else(|| Error::UnknownDeviceType(s.to_string()))
    }
}

/// Alpaca error numbers with a defined meaning
pub mod alpaca_error {
    pub const NOT_IMPLEMENTED: i32 = 0x400;
    pub const INVALID_VALUE: i32 = 0x401;
    pub const VALUE_NOT_SET: i32 = 0x402;
    pub const NOT_CONNECTED: i32 = 0x407;
    pub const INVALID_WHILE_PARKED: i32 = 0x408;
    pub const INVALID_WHILE_SLAVED: i32 = 0x409;
    pub const INVALID_OPERATION: i32 = 0x40B;
    pub const ACTION_NOT_IMPLEMENTED: i32 = 0x40C;
    pub const OPERATION_CANCELLED: i32 = 0x40E;
    pub const UNSPECIFIED_ERROR: i32 = 0x4FF;

    /// Symbolic name of a defined error number
    pub fn name(code: i32) -> Option<&'static str> {
        let name = match code {
            0 => "AlpacaNoError",
            NOT_IMPLEMENTED => "NotImplemented",
            INVALID_VALUE => "InvalidValue",
            VALUE_NOT_SET => "ValueNotSet",
            NOT_CONNECTED => "NotConnected",
            INVALID_WHILE_PARKED => "InvalidWhileParked",
            INVALID_WHILE_SLAVED => "InvalidWhileSlaved",
            INVALID_OPERATION => "InvalidOperationException",
            ACTION_NOT_IMPLEMENTED => "ActionNotImplementedException",
            OPERATION_CANCELLED => "OperationCancelled",
            UNSPECIFIED_ERROR => "UnspecifiedError",
            _ => return None,
        };
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_expected_set_deduplicates() {
        let set = ExpectedStatusSet::new([400, 400, 404]);
        assert_eq!(set.codes(), &[400, 404]);
        assert!(!set.is_any());
        assert!(ExpectedStatusSet::any().is_any());
        assert!(ExpectedStatusSet::ok().is_ok_only());
        assert!(ExpectedStatusSet::client_error().contains(410));
        assert!(!ExpectedStatusSet::client_error().contains(408));
    }

    #[test]
    fn test_parse_json_envelope() {
        let body = r#"{"Value":true,"ClientTransactionID":67890,"ServerTransactionID":12,"ErrorNumber":0,"ErrorMessage":""}"#;
        let parsed = ParsedResponse::from_json(body).unwrap();
        assert_eq!(parsed.client_transaction_id, 67890);
        assert_eq!(parsed.server_transaction_id, 12);
        assert!(!parsed.has_error());
    }

    #[test]
    fn test_parse_json_envelope_defaults_missing_fields() {
        let parsed = ParsedResponse::from_json(r#"{"ErrorNumber":1025,"ErrorMessage":null}"#).unwrap();
        assert_eq!(parsed.client_transaction_id, 0);
        assert_eq!(parsed.error_number, alpaca_error::INVALID_VALUE);
        assert!(parsed.has_error());
    }

    #[test]
    fn test_parse_json_rejects_non_json() {
        assert!(ParsedResponse::from_json("not json").is_err());
    }

    #[test_case("camera", DeviceType::Camera)]
    #[test_case("CoverCalibrator", DeviceType::CoverCalibrator)]
    #[test_case(" SAFETYMONITOR ", DeviceType::SafetyMonitor)]
    fn test_device_type_from_str(input: &str, expected: DeviceType) {
        assert_eq!(input.parse::<DeviceType>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_device_type() {
        assert!("toaster".parse::<DeviceType>().is_err());
    }

    #[test]
    fn test_error_names() {
        assert_eq!(alpaca_error::name(0x400), Some("NotImplemented"));
        assert_eq!(alpaca_error::name(0x401), Some("InvalidValue"));
        assert_eq!(alpaca_error::name(0x555), None);
    }
}
