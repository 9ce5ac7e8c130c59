use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{BookingId, ExternalRef, Result, StoreError, StoredRecord, StoredToken, Version};

/// Core trait for booking record storage.
///
/// All implementations must be thread-safe (Send + Sync). Updates are
/// conditional on the caller's expected version; a caller that loses the
/// race gets `ConcurrencyConflict` and must reload before trying again.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a new record at `Version::first()`.
    ///
    /// Fails with `AlreadyExists` if the ID is taken, or `ExternalRefTaken`
    /// if any of its references is owned by another record.
    async fn insert(&self, record: StoredRecord) -> Result<Version>;

    /// Retrieves a record by ID.
    async fn get(&self, record_id: BookingId) -> Result<Option<StoredRecord>>;

    /// Replaces a record if its stored version equals `expected`.
    ///
    /// Returns the new version. References present on the new record are
    /// added to the ownership index; references are never released.
    async fn update(&self, record: StoredRecord, expected: Version) -> Result<Version>;

    /// Finds the record owning an external reference.
    async fn find_by_external_ref(&self, reference: &ExternalRef)
    -> Result<Option<StoredRecord>>;
}

/// Outcome of an attempt to consume a recovery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The token was unused and is now marked used.
    Consumed(StoredToken),

    /// The token had already been marked used.
    AlreadyUsed,

    /// No token with this hash exists.
    NotFound,
}

/// Storage for recovery tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persists a newly issued token.
    async fn insert_token(&self, token: StoredToken) -> Result<()>;

    /// Retrieves a token by hash.
    async fn get_token(&self, token_hash: &str) -> Result<Option<StoredToken>>;

    /// Atomically marks a token used if it is not already.
    ///
    /// Exactly one concurrent caller can observe `Consumed` for a token.
    async fn consume_token(&self, token_hash: &str, used_at: DateTime<Utc>)
    -> Result<ConsumeOutcome>;

    /// Returns a consumed token to the unused state.
    ///
    /// Only succeeds while the token still carries the `used_at` written by
    /// the matching `consume_token` call. Returns whether the token was released.
    async fn release_token(&self, token_hash: &str, used_at: DateTime<Utc>) -> Result<bool>;
}

/// Extension trait providing convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Retrieves a record, failing with `NotFound` if it doesn't exist.
    async fn get_required(&self, record_id: BookingId) -> Result<StoredRecord> {
        self.get(record_id)
            .await?
            .ok_or(StoreError::NotFound(record_id))
    }

    /// Checks if a record exists.
    async fn exists(&self, record_id: BookingId) -> Result<bool> {
        Ok(self.get(record_id).await?.is_some())
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}
