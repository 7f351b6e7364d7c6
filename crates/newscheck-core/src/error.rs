//! Error types for newscheck.

use thiserror::Error;

/// newscheck error type.
///
/// Every variant is fatal for the run. Variants carrying a `payload` hold the
/// raw output that violated the contract so it can be shown to the operator.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Binary, source directory or port unusable before any check runs.
    #[error("{0}")]
    Environment(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The binary under test exited badly or produced nothing.
    #[error("{0}")]
    Execution(String),

    /// Output could not be decoded or had the wrong shape.
    #[error("{reason}")]
    Schema { reason: String, payload: String },

    /// The server answered with a status code the contract does not allow.
    #[error("{reason}")]
    Http {
        reason: String,
        payload: Option<String>,
    },

    /// The server never started accepting connections.
    #[error("HTTP request failed: {0}")]
    ConnectionRefused(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The server kept answering 503 past the retry window.
    #[error("Request timed out: 503 Service Unavailable")]
    Timeout { payload: String },

    #[error("Server process error: {0}")]
    Process(String),
}

impl Error {
    /// Raw output associated with the failure, if any.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Error::Schema { payload, .. } | Error::Timeout { payload } => Some(payload),
            Error::Http { payload, .. } => payload.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for newscheck operations.
pub type Result<T> = std::result::Result<T, Error>;
