//! Booking entity.

use booking_store::Version;
use chrono::{DateTime, Utc};
use common::{BookingId, BuilderId, ClientId, ExternalRef, SessionTypeId};
use serde::{Deserialize, Serialize};

use super::{BookingState, PaymentFailure, PaymentStatus, TimeSlot};

/// Input for creating a booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booking_id: BookingId,
    pub builder_id: BuilderId,
    pub session_type_id: SessionTypeId,
    pub client_id: Option<ClientId>,

    /// False for free sessions, which may confirm without a payment.
    pub payment_required: bool,
}

/// The booking entity.
///
/// Fields are only changed by the transition function; everything outside
/// this crate reads them through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub(crate) booking_id: BookingId,

    /// Version as last loaded from or written to the store.
    #[serde(skip, default)]
    pub(crate) version: Version,

    pub(crate) builder_id: BuilderId,
    pub(crate) client_id: Option<ClientId>,
    pub(crate) session_type_id: SessionTypeId,

    pub(crate) state: BookingState,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) payment_required: bool,

    pub(crate) slot: Option<TimeSlot>,

    /// Checkout session of the active payment attempt.
    pub(crate) external_session_ref: Option<String>,

    /// Checkout sessions of earlier attempts, retired by recovery.
    #[serde(default)]
    pub(crate) superseded_session_refs: Vec<String>,

    pub(crate) external_event_ref: Option<String>,

    pub(crate) last_payment_failure: Option<PaymentFailure>,
    pub(crate) cancellation_reason: Option<String>,

    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Booking {
    /// Record type name used by the store.
    pub const RECORD_TYPE: &'static str = "Booking";

    /// Creates a booking in `Idle`.
    pub fn new(input: NewBooking, now: DateTime<Utc>) -> Self {
        Self {
            booking_id: input.booking_id,
            version: Version::initial(),
            builder_id: input.builder_id,
            client_id: input.client_id,
            session_type_id: input.session_type_id,
            state: BookingState::Idle,
            payment_status: PaymentStatus::Unpaid,
            payment_required: input.payment_required,
            slot: None,
            external_session_ref: None,
            superseded_session_refs: Vec::new(),
            external_event_ref: None,
            last_payment_failure: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// Query methods
impl Booking {
    pub fn booking_id(&self) -> BookingId {
        self.booking_id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn builder_id(&self) -> &BuilderId {
        &self.builder_id
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    pub fn session_type_id(&self) -> &SessionTypeId {
        &self.session_type_id
    }

    pub fn state(&self) -> BookingState {
        self.state
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_required(&self) -> bool {
        self.payment_required
    }

    pub fn slot(&self) -> Option<&TimeSlot> {
        self.slot.as_ref()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.slot.as_ref().map(|s| s.start_time)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.slot.as_ref().map(|s| s.end_time)
    }

    pub fn client_timezone(&self) -> Option<&str> {
        self.slot.as_ref().map(|s| s.client_timezone.as_str())
    }

    pub fn external_session_ref(&self) -> Option<&str> {
        self.external_session_ref.as_deref()
    }

    pub fn superseded_session_refs(&self) -> &[String] {
        &self.superseded_session_refs
    }

    pub fn external_event_ref(&self) -> Option<&str> {
        self.external_event_ref.as_deref()
    }

    pub fn last_payment_failure(&self) -> Option<PaymentFailure> {
        self.last_payment_failure
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the booking is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns true if the booking is not bound to a client yet.
    pub fn is_anonymous(&self) -> bool {
        self.client_id.is_none()
    }

    /// Returns true if the booking has what `Confirmed` requires:
    /// a slot, and a payment unless the session is free.
    pub fn can_confirm(&self) -> bool {
        self.slot.is_some()
            && (self.payment_status == PaymentStatus::Paid || !self.payment_required)
    }

    /// Returns true if the session ref belongs to a retired payment attempt.
    pub fn is_superseded_session(&self, session_ref: &str) -> bool {
        self.superseded_session_refs.iter().any(|r| r == session_ref)
    }

    /// Returns every external reference this booking owns.
    pub fn external_refs(&self) -> Vec<ExternalRef> {
        self.external_session_ref
            .iter()
            .chain(self.superseded_session_refs.iter())
            .map(|id| ExternalRef::PaymentSession(id.clone()))
            .chain(
                self.external_event_ref
                    .iter()
                    .map(|id| ExternalRef::SchedulingEvent(id.clone())),
            )
            .collect()
    }
}
