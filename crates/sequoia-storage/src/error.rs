//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored settings value is not valid JSON for its key.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Creating the data directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No platform data directory (no home directory, usually).
    #[error("could not determine the app data directory")]
    NoDataDir,

    /// A thread panicked while holding the connection.
    #[error("database connection poisoned")]
    Poisoned,
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
