//! Live device property reads used to seed parameters and drive waits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use alpaca_conform_common::{HttpVerb, Parameter};

use crate::config::{ConformConfig, Setting};
use crate::error::{ConformError, ConformResult};
use crate::executor::TransactionExecutor;
use crate::variants::standard_parameters;

/// Where a request parameter value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    /// Fixed text sent as is
    Literal(String),
    /// Current value of a device property, or `fallback` if it cannot be read
    Live {
        property: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        arguments: Vec<Parameter>,
        fallback: Box<ValueSource>,
        /// Multiply a numeric value and truncate it to an integer
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<f64>,
    },
    Setting {
        setting: Setting,
    },
}

impl ValueSource {
    pub fn literal(value: impl Into<String>) -> Self {
        ValueSource::Literal(value.into())
    }

    /// Short human-readable description, e.g. `live(Position) or "1"`
    pub fn describe(&self) -> String {
        match self {
            ValueSource::Literal(value) => format!("{:?}", value),
            ValueSource::Live {
                property,
                arguments,
                fallback,
                scale,
            } => {
                let mut text = format!("live({}", property);
                for argument in arguments {
                    text.push_str(&format!(", {}={}", argument.name, argument.value));
                }
                text.push(')');
                if let Some(scale) = scale {
                    text.push_str(&format!(" x {}", scale));
                }
                format!("{} or {}", text, fallback.describe())
            }
            ValueSource::Setting { setting } => format!("setting({:?})", setting),
        }
    }
}

/// Reads and writes device properties outside the classified ledger
#[async_trait]
pub trait PropertySource: Send + Sync {
    /// The `Value` field of a successful GET
    async fn read(&self, member: &str, arguments: &[Parameter]) -> ConformResult<Value>;

    /// PUT a member, failing on any non-success response
    async fn write(&self, member: &str, parameters: &[Parameter]) -> ConformResult<()>;
}

fn check_envelope(member: &str, status: u16, body: &[u8], write: bool) -> ConformResult<Value> {
    let failure = |reason: String| {
        if write {
            ConformError::PropertyWrite {
                member: member.to_string(),
                reason,
            }
        } else {
            ConformError::Property {
                member: member.to_string(),
                reason,
            }
        }
    };

    if status != 200 {
        return Err(failure(format!("HTTP status {}", status)));
    }
    let json: Value = serde_json::from_slice(body).map_err(|e| failure(e.to_string()))?;
    let error_number = json.get("ErrorNumber").and_then(Value::as_i64).unwrap_or(0);
    if error_number != 0 {
        let message = json.get("ErrorMessage").and_then(Value::as_str).unwrap_or("");
        return Err(failure(format!("error 0x{:X}: {}", error_number, message)));
    }
    Ok(json)
}

#[async_trait]
impl PropertySource for TransactionExecutor {
    async fn read(&self, member: &str, arguments: &[Parameter]) -> ConformResult<Value> {
        let mut parameters = standard_parameters();
        parameters.extend_from_slice(arguments);
        let raw = self
            .send(HttpVerb::Get, &self.member_path(member), &parameters, false, false)
            .await?;
        let json = check_envelope(member, raw.status, &raw.body, false)?;
        json.get("Value").cloned().ok_or_else(|| ConformError::Property {
            member: member.to_string(),
            reason: "response has no Value field".into(),
        })
    }

    async fn write(&self, member: &str, parameters: &[Parameter]) -> ConformResult<()> {
        let mut all = standard_parameters();
        all.extend_from_slice(parameters);
        let raw = self
            .send(HttpVerb::Put, &self.member_path(member), &all, false, false)
            .await?;
        check_envelope(member, raw.status, &raw.body, true)?;
        Ok(())
    }
}

/// Render a property value as a request parameter value.
///
/// Booleans use `True`/`False`. A `scale` multiplies numbers and truncates the
/// product to an integer. Nulls, arrays and objects have no rendering.
pub fn format_value(value: &Value, scale: Option<f64>) -> Option<String> {
    match value {
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Number(number) => match scale {
            Some(scale) => number.as_f64().map(|n| ((n * scale).trunc() as i64).to_string()),
            None => Some(number.to_string()),
        },
        Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

/// Compare a live value against a wait target, numbers by value
pub fn values_equal(live: &Value, target: &Value) -> bool {
    match (live.as_f64(), target.as_f64()) {
        (Some(a), Some(b)) if live.is_number() && target.is_number() => a == b,
        _ => live == target,
    }
}

/// Resolve a value source, walking fallbacks until one produces a value
pub async fn resolve(source: &ValueSource, properties: &dyn PropertySource, config: &ConformConfig) -> String {
    let mut current = source;
    loop {
        match current {
            ValueSource::Literal(value) => return value.clone(),
            ValueSource::Setting { setting } => return config.setting_value(*setting),
            ValueSource::Live {
                property,
                arguments,
                fallback,
                scale,
            } => {
                match properties.read(property, arguments).await {
                    Ok(value) => match format_value(&value, *scale) {
                        Some(text) => return text,
                        None => debug!(property = %property, "live value has no text form, using fallback"),
                    },
                    Err(e) => debug!(property = %property, error = %e, "live read failed, using fallback"),
                }
                current = fallback;
            }
        }
    }
}
