//! Booking persistence and the single load-transition-persist cycle.

use booking_store::{RecordStore, StoredRecord, Version};
use common::{BookingId, ExternalRef};

use crate::booking::{Booking, BookingEvent, Transition, TransitionContext, transition};
use crate::error::DomainError;

/// Loads and saves bookings through a `RecordStore`.
///
/// Every save is conditional on the version the booking was loaded at, so
/// two writers racing on the same booking cannot both succeed; the loser
/// gets a `ConcurrencyConflict` and must run the cycle again.
#[derive(Debug, Clone)]
pub struct BookingRepository<S> {
    store: S,
}

impl<S: RecordStore> BookingRepository<S> {
    /// Creates a new repository over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads a booking, returning None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, booking_id: BookingId) -> Result<Option<Booking>, DomainError> {
        match self.store.get(booking_id).await? {
            Some(record) => Ok(Some(from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Loads a booking, failing with `NotFound` if it doesn't exist.
    pub async fn load_required(&self, booking_id: BookingId) -> Result<Booking, DomainError> {
        self.load(booking_id)
            .await?
            .ok_or(DomainError::NotFound(booking_id))
    }

    /// Finds the booking owning an external reference.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<Booking>, DomainError> {
        match self.store.find_by_external_ref(reference).await? {
            Some(record) => Ok(Some(from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Stores a new booking and returns it at its first version.
    #[tracing::instrument(skip(self, booking), fields(booking_id = %booking.booking_id()))]
    pub async fn insert(&self, booking: &Booking) -> Result<Booking, DomainError> {
        let version = self.store.insert(to_record(booking)?).await?;
        let mut stored = booking.clone();
        stored.set_version(version);
        Ok(stored)
    }

    /// Saves a booking if the stored copy is still at the version it was
    /// loaded at, returning the new version.
    #[tracing::instrument(
        skip(self, booking),
        fields(booking_id = %booking.booking_id(), expected = %booking.version())
    )]
    pub async fn save(&self, booking: &Booking) -> Result<Version, DomainError> {
        let version = self
            .store
            .update(to_record(booking)?, booking.version())
            .await?;
        Ok(version)
    }

    /// Runs one load-transition-persist cycle.
    ///
    /// Only `Applied` and `Merged` transitions are written. A rejected event
    /// leaves the store untouched. Conflicts are returned to the caller,
    /// which decides whether to retry.
    #[tracing::instrument(skip(self, event, ctx), fields(event = event.event_type()))]
    pub async fn execute(
        &self,
        booking_id: BookingId,
        event: &BookingEvent,
        ctx: &TransitionContext,
    ) -> Result<Transition, DomainError> {
        let current = self.load_required(booking_id).await?;
        let mut result = transition(&current, event, ctx)?;
        self.persist(&mut result).await?;
        Ok(result)
    }

    /// Writes a computed transition if it changed the booking, updating the
    /// booking's version in place.
    pub async fn persist(&self, result: &mut Transition) -> Result<(), DomainError> {
        if result.changes_record() {
            let version = self.save(&result.booking).await?;
            result.booking.set_version(version);
        }
        Ok(())
    }
}

fn to_record(booking: &Booking) -> Result<StoredRecord, DomainError> {
    Ok(StoredRecord {
        record_id: booking.booking_id(),
        record_type: Booking::RECORD_TYPE.to_string(),
        version: booking.version(),
        state: booking.state().as_str().to_string(),
        external_refs: booking.external_refs(),
        payload: serde_json::to_value(booking)?,
        created_at: booking.created_at(),
        updated_at: booking.updated_at(),
    })
}

fn from_record(record: StoredRecord) -> Result<Booking, DomainError> {
    if record.record_type != Booking::RECORD_TYPE {
        return Err(DomainError::UnexpectedRecordType {
            record_id: record.record_id,
            record_type: record.record_type,
        });
    }
    let mut booking: Booking = serde_json::from_value(record.payload)?;
    booking.set_version(record.version);
    Ok(booking)
}
