//! Durable storage for booking records and recovery tokens.
//!
//! Records are stored as versioned JSON payloads. Every update is a
//! compare-and-swap on the record version, which is what serializes
//! concurrent transitions on the same booking.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;
pub mod token;
pub mod version;

pub use common::{BookingId, ExternalRef};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use record::{StoredRecord, StoredRecordBuilder};
pub use store::{ConsumeOutcome, RecordStore, RecordStoreExt, TokenStore};
pub use token::StoredToken;
pub use version::Version;
