use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    BookingId, ExternalRef, Result, StoreError, StoredRecord, StoredToken, Version,
    store::{ConsumeOutcome, RecordStore, TokenStore},
};

#[derive(Debug, Default)]
struct RecordTable {
    records: HashMap<BookingId, StoredRecord>,
    refs: HashMap<String, BookingId>,
}

impl RecordTable {
    fn check_refs(&self, record: &StoredRecord) -> Result<()> {
        for reference in &record.external_refs {
            if let Some(owner) = self.refs.get(&reference.index_key())
                && *owner != record.record_id
            {
                return Err(StoreError::ExternalRefTaken {
                    reference: reference.clone(),
                    owner: *owner,
                });
            }
        }
        Ok(())
    }

    fn index_refs(&mut self, record: &StoredRecord) {
        for reference in &record.external_refs {
            self.refs.insert(reference.index_key(), record.record_id);
        }
    }
}

/// In-memory store implementation for tests and local development.
///
/// Provides the same compare-and-swap and reference-ownership semantics
/// as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    table: Arc<RwLock<RecordTable>>,
    tokens: Arc<RwLock<HashMap<String, StoredToken>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records stored.
    pub async fn record_count(&self) -> usize {
        self.table.read().await.records.len()
    }

    /// Returns the number of tokens stored.
    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Clears all records and tokens.
    pub async fn clear(&self) {
        let mut table = self.table.write().await;
        table.records.clear();
        table.refs.clear();
        self.tokens.write().await.clear();
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, mut record: StoredRecord) -> Result<Version> {
        let mut table = self.table.write().await;

        if table.records.contains_key(&record.record_id) {
            return Err(StoreError::AlreadyExists(record.record_id));
        }
        table.check_refs(&record)?;

        record.version = Version::first();
        table.index_refs(&record);
        table.records.insert(record.record_id, record);

        Ok(Version::first())
    }

    async fn get(&self, record_id: BookingId) -> Result<Option<StoredRecord>> {
        let table = self.table.read().await;
        Ok(table.records.get(&record_id).cloned())
    }

    async fn update(&self, mut record: StoredRecord, expected: Version) -> Result<Version> {
        let mut table = self.table.write().await;

        let actual = table
            .records
            .get(&record.record_id)
            .map(|r| r.version)
            .ok_or(StoreError::NotFound(record.record_id))?;

        if actual != expected {
            tracing::debug!(record_id = %record.record_id, %expected, %actual, "stale record update rejected");
            return Err(StoreError::ConcurrencyConflict {
                record_id: record.record_id,
                expected,
                actual,
            });
        }
        table.check_refs(&record)?;

        let new_version = expected.next();
        record.version = new_version;
        table.index_refs(&record);
        table.records.insert(record.record_id, record);

        Ok(new_version)
    }

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<StoredRecord>> {
        let table = self.table.read().await;
        Ok(table
            .refs
            .get(&reference.index_key())
            .and_then(|id| table.records.get(id))
            .cloned())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn insert_token(&self, token: StoredToken) -> Result<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token_hash) {
            return Err(StoreError::DuplicateToken);
        }
        tokens.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn get_token(&self, token_hash: &str) -> Result<Option<StoredToken>> {
        Ok(self.tokens.read().await.get(token_hash).cloned())
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        used_at: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        let mut tokens = self.tokens.write().await;

        // Check-and-set under the write lock
        let Some(token) = tokens.get_mut(token_hash) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        if token.used_at.is_some() {
            return Ok(ConsumeOutcome::AlreadyUsed);
        }

        token.used_at = Some(used_at);
        Ok(ConsumeOutcome::Consumed(token.clone()))
    }

    async fn release_token(&self, token_hash: &str, used_at: DateTime<Utc>) -> Result<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(token_hash) {
            Some(token) if token.used_at == Some(used_at) => {
                token.used_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordStoreExt;
    use chrono::Duration;

    fn create_test_record(record_id: BookingId, state: &str) -> StoredRecord {
        StoredRecord::builder()
            .record_id(record_id)
            .record_type("Booking")
            .state(state)
            .payload_raw(serde_json::json!({"state": state}))
            .try_build()
            .unwrap()
    }

    fn create_test_token(hash: &str, booking_id: BookingId) -> StoredToken {
        let now = Utc::now();
        StoredToken {
            token_hash: hash.to_string(),
            booking_id,
            target_state: None,
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            used_at: None,
        }
    }

    #[tokio::test]
    async fn insert_assigns_first_version() {
        let store = InMemoryStore::new();
        let id = BookingId::new();

        let version = store.insert(create_test_record(id, "Idle")).await.unwrap();
        assert_eq!(version, Version::first());

        let stored = store.get_required(id).await.unwrap();
        assert_eq!(stored.version, Version::first());
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        let id = BookingId::new();

        store.insert(create_test_record(id, "Idle")).await.unwrap();
        let result = store.insert(create_test_record(id, "Idle")).await;

        assert!(matches!(result, Err(StoreError::AlreadyExists(dup)) if dup == id));
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn update_with_matching_version_succeeds() {
        let store = InMemoryStore::new();
        let id = BookingId::new();
        store.insert(create_test_record(id, "Idle")).await.unwrap();

        let version = store
            .update(create_test_record(id, "SessionTypeSelected"), Version::first())
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        let stored = store.get_required(id).await.unwrap();
        assert_eq!(stored.state, "SessionTypeSelected");
    }

    #[tokio::test]
    async fn concurrency_conflict_on_stale_version() {
        let store = InMemoryStore::new();
        let id = BookingId::new();
        store.insert(create_test_record(id, "Idle")).await.unwrap();

        // Two writers both read version 1
        store
            .update(create_test_record(id, "SessionTypeSelected"), Version::first())
            .await
            .unwrap();
        let result = store
            .update(create_test_record(id, "Cancelled"), Version::first())
            .await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::first() && actual == Version::new(2)
        ));
        let stored = store.get_required(id).await.unwrap();
        assert_eq!(stored.state, "SessionTypeSelected");
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let store = InMemoryStore::new();
        let id = BookingId::new();

        let result = store
            .update(create_test_record(id, "Idle"), Version::first())
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn external_ref_lookup_and_exclusive_ownership() {
        let store = InMemoryStore::new();
        let first = BookingId::new();
        let second = BookingId::new();
        let reference = ExternalRef::PaymentSession("cs_test_1".to_string());

        store.insert(create_test_record(first, "Idle")).await.unwrap();
        store
            .insert(create_test_record(second, "Idle"))
            .await
            .unwrap();

        let mut owned = create_test_record(first, "PaymentPending");
        owned.external_refs.push(reference.clone());
        store.update(owned, Version::first()).await.unwrap();

        let found = store.find_by_external_ref(&reference).await.unwrap();
        assert_eq!(found.map(|r| r.record_id), Some(first));

        let mut stolen = create_test_record(second, "PaymentPending");
        stolen.external_refs.push(reference.clone());
        let result = store.update(stolen, Version::first()).await;
        assert!(matches!(
            result,
            Err(StoreError::ExternalRefTaken { owner, .. }) if owner == first
        ));
    }

    #[tokio::test]
    async fn unknown_external_ref_returns_none() {
        let store = InMemoryStore::new();
        let reference = ExternalRef::SchedulingEvent("evt_missing".to_string());
        assert!(store.find_by_external_ref(&reference).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_is_consumed_exactly_once() {
        let store = InMemoryStore::new();
        let booking_id = BookingId::new();
        store
            .insert_token(create_test_token("hash-1", booking_id))
            .await
            .unwrap();

        let first = store.consume_token("hash-1", Utc::now()).await.unwrap();
        assert!(matches!(first, ConsumeOutcome::Consumed(ref t) if t.is_used()));

        let second = store.consume_token("hash-1", Utc::now()).await.unwrap();
        assert_eq!(second, ConsumeOutcome::AlreadyUsed);

        let missing = store.consume_token("hash-2", Utc::now()).await.unwrap();
        assert_eq!(missing, ConsumeOutcome::NotFound);
    }

    #[tokio::test]
    async fn released_token_can_be_consumed_again() {
        let store = InMemoryStore::new();
        let booking_id = BookingId::new();
        store
            .insert_token(create_test_token("hash-1", booking_id))
            .await
            .unwrap();

        let used_at = Utc::now();
        store.consume_token("hash-1", used_at).await.unwrap();

        // A release carrying someone else's timestamp leaves the token used
        let stale = used_at - Duration::seconds(1);
        assert!(!store.release_token("hash-1", stale).await.unwrap());
        assert!(store.get_token("hash-1").await.unwrap().unwrap().is_used());

        assert!(store.release_token("hash-1", used_at).await.unwrap());
        assert!(!store.get_token("hash-1").await.unwrap().unwrap().is_used());
        assert!(!store.release_token("hash-1", used_at).await.unwrap());
        assert!(!store.release_token("hash-2", used_at).await.unwrap());

        let again = store.consume_token("hash-1", Utc::now()).await.unwrap();
        assert!(matches!(again, ConsumeOutcome::Consumed(_)));
    }

    #[tokio::test]
    async fn duplicate_token_hash_is_rejected() {
        let store = InMemoryStore::new();
        let booking_id = BookingId::new();
        store
            .insert_token(create_test_token("hash-1", booking_id))
            .await
            .unwrap();

        let result = store
            .insert_token(create_test_token("hash-1", booking_id))
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateToken)));
        assert_eq!(store.token_count().await, 1);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = InMemoryStore::new();
        let id = BookingId::new();
        store.insert(create_test_record(id, "Idle")).await.unwrap();
        store
            .insert_token(create_test_token("hash-1", id))
            .await
            .unwrap();

        store.clear().await;

        assert_eq!(store.record_count().await, 0);
        assert_eq!(store.token_count().await, 0);
    }
}
