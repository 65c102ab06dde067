//! Bridge error types.

use std::time::Duration;

use thiserror::Error;

/// Errors seen by callers of the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The actor is gone or its channel is closed.
    #[error("Bridge context invalidated")]
    ContextInvalidated,

    /// No response arrived in time.
    #[error("Bridge call timed out after {0:?}")]
    Timeout(Duration),

    /// The actor answered with a response of the wrong kind.
    #[error("Unexpected bridge response: expected {0}")]
    UnexpectedResponse(&'static str),

    /// The actor could not complete the request.
    #[error("Bridge request failed: {0}")]
    Failed(String),
}

/// Errors talking to the compression oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle returned HTTP {0}")]
    Status(u16),

    #[error("Oracle error: {0}")]
    Service(String),
}

/// Result type for bridge calls.
pub type Result<T> = std::result::Result<T, BridgeError>;
