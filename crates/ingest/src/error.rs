//! Ingestion error types.

use thiserror::Error;

/// Errors raised while verifying or translating inbound events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    /// The webhook failed its authenticity check.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// The body could not be parsed into the provider's event shape.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A user action is missing something it needs.
    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::MalformedPayload(e.to_string())
    }
}

/// Convenience type alias for ingestion results.
pub type Result<T> = std::result::Result<T, IngestError>;
