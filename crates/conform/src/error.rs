//! Error types for the conformance engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConformError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] alpaca_conform_common::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Plan parse error: {0}")]
    PlanParse(String),

    #[error("The \"{action}\" operation exceeded the timeout of {seconds} seconds specified for this operation.")]
    WaitTimeout { action: String, seconds: u64 },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Could not read {member}: {reason}")]
    Property { member: String, reason: String },

    #[error("Could not write {member}: {reason}")]
    PropertyWrite { member: String, reason: String },

    #[error("The request was cancelled")]
    Cancelled,

    #[error("The request timed out after {0:.1} seconds")]
    RequestTimeout(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

pub type ConformResult<T> = Result<T, ConformError>;
