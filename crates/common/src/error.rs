//! Error types for the shared Alpaca vocabulary

use thiserror::Error;

/// Result type alias using the common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while interpreting Alpaca wire data
#[derive(Error, Debug)]
pub enum Error {
    #[error("ImageBytes frame error: {0}")]
    Frame(String),

    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
