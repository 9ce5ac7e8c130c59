//! Domain error types.

use booking_store::StoreError;
use common::BookingId;
use thiserror::Error;

use crate::booking::{ParseStateError, TransitionError};

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The transition function rejected the event.
    #[error("Transition rejected: {0}")]
    Transition(#[from] TransitionError),

    /// Booking not found.
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// A stored record is not a booking.
    #[error("Record {record_id} has type {record_type}, expected Booking")]
    UnexpectedRecordType {
        record_id: BookingId,
        record_type: String,
    },

    /// A stored token names a state this build does not know.
    #[error("Stored token is corrupt: {0}")]
    CorruptToken(#[from] ParseStateError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if the error is an optimistic-concurrency loss that a
    /// fresh load-transition-persist cycle may resolve.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DomainError::Store(StoreError::ConcurrencyConflict { .. }))
    }
}
