use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookingId, ExternalRef, Version};

/// A booking record as the store sees it.
///
/// The store does not interpret the payload. It only needs the record ID,
/// the version for compare-and-swap, the state name for indexing, and the
/// external references it must keep uniquely owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The booking this record holds.
    pub record_id: BookingId,

    /// The type of record (e.g., "Booking").
    pub record_type: String,

    /// Version of the record as last persisted.
    pub version: Version,

    /// Current lifecycle state name, denormalized for queries.
    pub state: String,

    /// External references owned by this record. Never shrinks.
    pub external_refs: Vec<ExternalRef>,

    /// The record body as JSON.
    pub payload: serde_json::Value,

    /// When the record was first stored.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Creates a new record builder.
    pub fn builder() -> StoredRecordBuilder {
        StoredRecordBuilder::default()
    }

    /// Returns true if this record owns the given reference.
    pub fn owns(&self, reference: &ExternalRef) -> bool {
        self.external_refs.contains(reference)
    }
}

/// Builder for constructing stored records.
#[derive(Debug, Default)]
pub struct StoredRecordBuilder {
    record_id: Option<BookingId>,
    record_type: Option<String>,
    version: Option<Version>,
    state: Option<String>,
    external_refs: Vec<ExternalRef>,
    payload: Option<serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl StoredRecordBuilder {
    /// Sets the record ID.
    pub fn record_id(mut self, id: BookingId) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Sets the record type.
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Sets the version. Defaults to `Version::initial()`.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the state name.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Adds an external reference.
    pub fn external_ref(mut self, reference: ExternalRef) -> Self {
        if !self.external_refs.contains(&reference) {
            self.external_refs.push(reference);
        }
        self
    }

    /// Adds several external references.
    pub fn external_refs(mut self, references: impl IntoIterator<Item = ExternalRef>) -> Self {
        for reference in references {
            self = self.external_ref(reference);
        }
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the creation timestamp. If not set, the current time will be used.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Sets the update timestamp. If not set, the creation timestamp will be used.
    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Tries to build the record, returning None if required fields are missing.
    ///
    /// `record_id`, `record_type`, `state`, and `payload` are required.
    pub fn try_build(self) -> Option<StoredRecord> {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Some(StoredRecord {
            record_id: self.record_id?,
            record_type: self.record_type?,
            version: self.version.unwrap_or_default(),
            state: self.state?,
            external_refs: self.external_refs,
            payload: self.payload?,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        })
    }
}
