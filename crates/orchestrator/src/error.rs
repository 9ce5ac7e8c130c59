//! Orchestration error types and the caller-facing error taxonomy.

use booking_store::StoreError;
use common::BookingId;
use domain::{DomainError, TransitionError};
use ingest::IngestError;
use serde::Serialize;
use thiserror::Error;

/// Error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    IllegalTransition,
    InvalidSignature,
    ConcurrencyConflict,
    TokenExpired,
    TokenAlreadyUsed,
    Forbidden,
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::IllegalTransition => "illegal_transition",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::TokenAlreadyUsed => "token_already_used",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by orchestrator entry points.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Malformed input, rejected before touching state.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Booking not found.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// Recovery token not found.
    #[error("Recovery token not found")]
    TokenNotFound,

    /// The transition function rejected the event.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// An inbound event failed verification or translation.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Every attempt lost the compare-and-swap race.
    #[error("Concurrency conflict on booking {booking_id} after {attempts} attempts")]
    ConcurrencyConflict { booking_id: BookingId, attempts: u32 },

    #[error("Recovery token expired")]
    TokenExpired,

    #[error("Recovery token already used")]
    TokenAlreadyUsed,

    /// The actor may not perform the action.
    #[error("Forbidden: {action} on booking {booking_id:?}")]
    Forbidden {
        action: &'static str,
        booking_id: Option<BookingId>,
    },

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Any other domain failure (serialization, corrupt records).
    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl BookingError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_) => ErrorKind::ValidationError,
            BookingError::BookingNotFound(_) | BookingError::TokenNotFound => ErrorKind::NotFound,
            BookingError::Transition(e) if e.is_illegal_transition() => {
                ErrorKind::IllegalTransition
            }
            BookingError::Transition(_) => ErrorKind::ValidationError,
            BookingError::Ingest(IngestError::InvalidSignature(_)) => ErrorKind::InvalidSignature,
            BookingError::Ingest(_) => ErrorKind::ValidationError,
            BookingError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            BookingError::TokenExpired => ErrorKind::TokenExpired,
            BookingError::TokenAlreadyUsed => ErrorKind::TokenAlreadyUsed,
            BookingError::Forbidden { .. } => ErrorKind::Forbidden,
            BookingError::Store(_) | BookingError::Domain(_) => ErrorKind::UnexpectedError,
        }
    }

    /// Returns a message safe to show external callers.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::UnexpectedError => "an unexpected error occurred".to_string(),
            ErrorKind::InvalidSignature => "invalid signature".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => BookingError::BookingNotFound(id),
            StoreError::ConcurrencyConflict { record_id, .. } => BookingError::ConcurrencyConflict {
                booking_id: record_id,
                attempts: 1,
            },
            StoreError::ExternalRefTaken { reference, .. } => BookingError::Validation(format!(
                "{reference} already belongs to another booking"
            )),
            other => BookingError::Store(other),
        }
    }
}

impl From<DomainError> for BookingError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound(id) => BookingError::BookingNotFound(id),
            DomainError::Transition(e) => BookingError::Transition(e),
            DomainError::Store(e) => e.into(),
            other => BookingError::Domain(other),
        }
    }
}

/// Convenience type alias for orchestration results.
pub type Result<T> = std::result::Result<T, BookingError>;
