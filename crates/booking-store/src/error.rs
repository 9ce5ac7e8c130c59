use thiserror::Error;

use crate::{BookingId, ExternalRef, Version};

/// Errors that can occur when interacting with the booking store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compare-and-swap update lost the race.
    /// The expected version did not match the stored version.
    #[error(
        "Concurrency conflict for booking {record_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        record_id: BookingId,
        expected: Version,
        actual: Version,
    },

    /// The record was not found.
    #[error("Record not found: {0}")]
    NotFound(BookingId),

    /// A record with this ID already exists.
    #[error("Record already exists: {0}")]
    AlreadyExists(BookingId),

    /// An external reference is already owned by a different booking.
    #[error("External reference {reference} is already owned by booking {owner}")]
    ExternalRefTaken {
        reference: ExternalRef,
        owner: BookingId,
    },

    /// A recovery token with this hash already exists.
    #[error("Recovery token already exists")]
    DuplicateToken,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
