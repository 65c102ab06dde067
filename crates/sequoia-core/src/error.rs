//! Core error types.

use thiserror::Error;

use crate::provider::Provider;

/// Errors raised while writing a replacement prompt back into a request body.
///
/// A rewrite error never leaves a half-edited body behind: the caller still
/// holds the original request and sends that instead.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The field the locator points at is gone or has the wrong type.
    #[error("located field is missing or not text: {0}")]
    MissingField(String),

    /// The locator was produced for a different kind of document.
    #[error("locator does not fit the {0} document")]
    LocatorMismatch(Provider),

    /// A form-encoded body no longer carries the expected parameter.
    #[error("form parameter not found: {0}")]
    MissingFormParam(String),

    /// Re-serialising the document failed.
    #[error("failed to serialize body: {0}")]
    Serialize(#[from] serde_json::Error),
}
