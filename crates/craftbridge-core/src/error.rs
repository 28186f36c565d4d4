//! Error types for craftbridge

use thiserror::Error;

/// Result type for craftbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// craftbridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Required setting missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat transport connect/send failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote console connect/auth/exec failure
    #[error("RCON error: {0}")]
    Rcon(String),

    /// Malformed wire data
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session credential could not be decoded
    #[error("Credential error: {0}")]
    Credential(String),

    /// Renewal API rejected or failed the exchange
    #[error("Renewal error: {0}")]
    Renewal(String),

    /// Outbound HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Filesystem or process I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A background task has already stopped
    #[error("{0} is closed")]
    Closed(&'static str),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}
