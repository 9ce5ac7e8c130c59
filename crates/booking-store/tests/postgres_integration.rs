//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p booking-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use booking_store::{
    BookingId, ConsumeOutcome, ExternalRef, PostgresStore, RecordStore, RecordStoreExt,
    StoreError, StoredRecord, StoredToken, TokenStore, Version,
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!("../../../migrations/001_create_bookings.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE recovery_tokens, booking_external_refs, bookings")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn create_test_record(record_id: BookingId, state: &str) -> StoredRecord {
    StoredRecord::builder()
        .record_id(record_id)
        .record_type("Booking")
        .state(state)
        .payload_raw(serde_json::json!({"state": state}))
        .try_build()
        .unwrap()
}

#[tokio::test]
async fn insert_and_get_record() {
    let store = get_test_store().await;
    let id = BookingId::new();

    let version = store.insert(create_test_record(id, "Idle")).await.unwrap();
    assert_eq!(version, Version::first());

    let stored = store.get_required(id).await.unwrap();
    assert_eq!(stored.state, "Idle");
    assert_eq!(stored.version, Version::first());
    assert_eq!(stored.payload, serde_json::json!({"state": "Idle"}));
}

#[tokio::test]
async fn insert_duplicate_id_fails() {
    let store = get_test_store().await;
    let id = BookingId::new();

    store.insert(create_test_record(id, "Idle")).await.unwrap();
    let result = store.insert(create_test_record(id, "Idle")).await;

    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
async fn update_is_compare_and_swap() {
    let store = get_test_store().await;
    let id = BookingId::new();
    store.insert(create_test_record(id, "Idle")).await.unwrap();

    let v2 = store
        .update(create_test_record(id, "SessionTypeSelected"), Version::first())
        .await
        .unwrap();
    assert_eq!(v2, Version::new(2));

    let stale = store
        .update(create_test_record(id, "Cancelled"), Version::first())
        .await;
    assert!(matches!(
        stale,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(2)
    ));

    let stored = store.get_required(id).await.unwrap();
    assert_eq!(stored.state, "SessionTypeSelected");
}

#[tokio::test]
async fn concurrent_updates_have_one_winner() {
    let store = get_test_store().await;
    let id = BookingId::new();
    store.insert(create_test_record(id, "TimeSelected")).await.unwrap();

    let a = store.clone();
    let b = store.clone();
    let (ra, rb) = tokio::join!(
        a.update(create_test_record(id, "Confirmed"), Version::first()),
        b.update(create_test_record(id, "Cancelled"), Version::first()),
    );

    let winners = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn update_missing_record_is_not_found() {
    let store = get_test_store().await;
    let result = store
        .update(create_test_record(BookingId::new(), "Idle"), Version::first())
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn external_refs_are_exclusive_and_searchable() {
    let store = get_test_store().await;
    let first = BookingId::new();
    let second = BookingId::new();
    let reference = ExternalRef::PaymentSession("cs_test_pg".to_string());

    store.insert(create_test_record(first, "Idle")).await.unwrap();
    store.insert(create_test_record(second, "Idle")).await.unwrap();

    let mut owned = create_test_record(first, "PaymentPending");
    owned.external_refs.push(reference.clone());
    store.update(owned, Version::first()).await.unwrap();

    let found = store.find_by_external_ref(&reference).await.unwrap().unwrap();
    assert_eq!(found.record_id, first);
    assert_eq!(found.external_refs, vec![reference.clone()]);

    let mut stolen = create_test_record(second, "PaymentPending");
    stolen.external_refs.push(reference.clone());
    let result = store.update(stolen, Version::first()).await;
    assert!(matches!(result, Err(StoreError::ExternalRefTaken { .. })));

    // The failed update rolled back entirely
    let second_stored = store.get_required(second).await.unwrap();
    assert_eq!(second_stored.version, Version::first());
    assert_eq!(second_stored.state, "Idle");
}

#[tokio::test]
async fn token_consumption_is_single_use() {
    let store = get_test_store().await;
    let booking_id = BookingId::new();
    store
        .insert(create_test_record(booking_id, "Error"))
        .await
        .unwrap();

    let now = Utc::now();
    let token = StoredToken {
        token_hash: "a".repeat(64),
        booking_id,
        target_state: Some("Idle".to_string()),
        issued_at: now,
        expires_at: now + Duration::minutes(15),
        used_at: None,
    };
    store.insert_token(token.clone()).await.unwrap();

    let fetched = store.get_token(&token.token_hash).await.unwrap().unwrap();
    assert_eq!(fetched.target_state.as_deref(), Some("Idle"));

    let first = store.consume_token(&token.token_hash, now).await.unwrap();
    assert!(matches!(first, ConsumeOutcome::Consumed(_)));

    let second = store.consume_token(&token.token_hash, now).await.unwrap();
    assert_eq!(second, ConsumeOutcome::AlreadyUsed);

    let missing = store.consume_token(&"b".repeat(64), now).await.unwrap();
    assert_eq!(missing, ConsumeOutcome::NotFound);
}

#[tokio::test]
async fn released_token_returns_to_unused() {
    let store = get_test_store().await;
    let booking_id = BookingId::new();
    store
        .insert(create_test_record(booking_id, "Error"))
        .await
        .unwrap();

    let now = Utc::now();
    let token = StoredToken {
        token_hash: "c".repeat(64),
        booking_id,
        target_state: None,
        issued_at: now,
        expires_at: now + Duration::minutes(15),
        used_at: None,
    };
    store.insert_token(token.clone()).await.unwrap();

    let ConsumeOutcome::Consumed(consumed) =
        store.consume_token(&token.token_hash, now).await.unwrap()
    else {
        panic!("expected the token to be consumed");
    };
    let used_at = consumed.used_at.unwrap();

    let stale = used_at - Duration::seconds(1);
    assert!(!store.release_token(&token.token_hash, stale).await.unwrap());
    assert!(store.release_token(&token.token_hash, used_at).await.unwrap());

    let fetched = store.get_token(&token.token_hash).await.unwrap().unwrap();
    assert!(fetched.used_at.is_none());

    let again = store
        .consume_token(&token.token_hash, Utc::now())
        .await
        .unwrap();
    assert!(matches!(again, ConsumeOutcome::Consumed(_)));
}
