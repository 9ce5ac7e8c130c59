use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    BookingId, ExternalRef, Result, StoreError, StoredRecord, StoredToken, Version,
    store::{ConsumeOutcome, RecordStore, TokenStore},
};

const RECORD_COLUMNS: &str =
    "id, record_type, version, state, external_refs, payload, created_at, updated_at";

const TOKEN_COLUMNS: &str = "token_hash, booking_id, target_state, issued_at, expires_at, used_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<StoredRecord> {
        let refs_json: serde_json::Value = row.try_get("external_refs")?;
        let external_refs: Vec<ExternalRef> = serde_json::from_value(refs_json)?;

        Ok(StoredRecord {
            record_id: BookingId::from_uuid(row.try_get::<Uuid, _>("id")?),
            record_type: row.try_get("record_type")?,
            version: Version::new(row.try_get("version")?),
            state: row.try_get("state")?,
            external_refs,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_token(row: PgRow) -> Result<StoredToken> {
        Ok(StoredToken {
            token_hash: row.try_get("token_hash")?,
            booking_id: BookingId::from_uuid(row.try_get::<Uuid, _>("booking_id")?),
            target_state: row.try_get("target_state")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
            used_at: row.try_get("used_at")?,
        })
    }

    /// Claims every reference on the record for it, inside the caller's transaction.
    async fn claim_refs(
        tx: &mut Transaction<'_, Postgres>,
        record: &StoredRecord,
    ) -> Result<()> {
        for reference in &record.external_refs {
            sqlx::query(
                r#"
                INSERT INTO booking_external_refs (ref_key, booking_id)
                VALUES ($1, $2)
                ON CONFLICT (ref_key) DO NOTHING
                "#,
            )
            .bind(reference.index_key())
            .bind(record.record_id.as_uuid())
            .execute(&mut **tx)
            .await?;

            let owner: Uuid =
                sqlx::query_scalar("SELECT booking_id FROM booking_external_refs WHERE ref_key = $1")
                    .bind(reference.index_key())
                    .fetch_one(&mut **tx)
                    .await?;

            if owner != record.record_id.as_uuid() {
                return Err(StoreError::ExternalRefTaken {
                    reference: reference.clone(),
                    owner: BookingId::from_uuid(owner),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn insert(&self, record: StoredRecord) -> Result<Version> {
        let record_id = record.record_id;
        let refs_json = serde_json::to_value(&record.external_refs)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, record_type, version, state, external_refs, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record_id.as_uuid())
        .bind(&record.record_type)
        .bind(Version::first().as_i64())
        .bind(&record.state)
        .bind(refs_json)
        .bind(&record.payload)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("bookings_pkey")
            {
                return StoreError::AlreadyExists(record_id);
            }
            StoreError::Database(e)
        })?;

        Self::claim_refs(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(Version::first())
    }

    async fn get(&self, record_id: BookingId) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM bookings WHERE id = $1"))
            .bind(record_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn update(&self, record: StoredRecord, expected: Version) -> Result<Version> {
        let record_id = record.record_id;
        let new_version = expected.next();
        let refs_json = serde_json::to_value(&record.external_refs)?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET version = $1, state = $2, external_refs = $3, payload = $4, updated_at = $5
            WHERE id = $6 AND version = $7
            "#,
        )
        .bind(new_version.as_i64())
        .bind(&record.state)
        .bind(refs_json)
        .bind(&record.payload)
        .bind(record.updated_at)
        .bind(record_id.as_uuid())
        .bind(expected.as_i64())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM bookings WHERE id = $1")
                    .bind(record_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            tracing::debug!(%record_id, %expected, ?actual, "stale record update rejected");
            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    record_id,
                    expected,
                    actual: Version::new(actual),
                },
                None => StoreError::NotFound(record_id),
            });
        }

        Self::claim_refs(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(new_version)
    }

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            r#"
            SELECT b.id, b.record_type, b.version, b.state, b.external_refs, b.payload, b.created_at, b.updated_at
            FROM bookings b
            JOIN booking_external_refs r ON r.booking_id = b.id
            WHERE r.ref_key = $1
            "#,
        )
        .bind(reference.index_key())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }
}

#[async_trait]
impl TokenStore for PostgresStore {
    async fn insert_token(&self, token: StoredToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recovery_tokens (token_hash, booking_id, target_state, issued_at, expires_at, used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.booking_id.as_uuid())
        .bind(&token.target_state)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("recovery_tokens_pkey")
            {
                return StoreError::DuplicateToken;
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_token(&self, token_hash: &str) -> Result<Option<StoredToken>> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM recovery_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_token).transpose()
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        used_at: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        // The `used_at IS NULL` guard makes this a single-winner update
        let row = sqlx::query(&format!(
            "UPDATE recovery_tokens SET used_at = $1 WHERE token_hash = $2 AND used_at IS NULL RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(used_at)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(ConsumeOutcome::Consumed(Self::row_to_token(row)?));
        }

        let exists: Option<String> =
            sqlx::query_scalar("SELECT token_hash FROM recovery_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;

        Ok(if exists.is_some() {
            ConsumeOutcome::AlreadyUsed
        } else {
            ConsumeOutcome::NotFound
        })
    }

    async fn release_token(&self, token_hash: &str, used_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE recovery_tokens SET used_at = NULL WHERE token_hash = $1 AND used_at = $2",
        )
        .bind(token_hash)
        .bind(used_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
