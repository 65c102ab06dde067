//! Error types for the proxy.

use thiserror::Error;

use hudsucker::rcgen;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("CA error: {0}")]
    Ca(#[from] CaManagerError),

    /// hudsucker rejected the proxy configuration.
    #[error("failed to build proxy: {0}")]
    Build(String),

    /// The proxy stopped with an error while serving.
    #[error("proxy error: {0}")]
    Serve(String),
}

/// Errors from creating or loading the root CA.
#[derive(Debug, Error)]
pub enum CaManagerError {
    /// No platform data directory to keep the CA in.
    #[error("could not determine the app data directory")]
    NoDataDir,

    /// Reading or writing the CA files failed.
    #[error("CA file error: {0}")]
    Io(#[from] std::io::Error),

    /// Key generation, signing or PEM loading failed.
    #[error("certificate error: {0}")]
    Certificate(#[from] rcgen::Error),

    /// The stored certificate is not a PEM `CERTIFICATE` block.
    #[error("invalid CA certificate: {0}")]
    InvalidPem(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
