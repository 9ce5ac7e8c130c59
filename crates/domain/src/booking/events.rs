//! Canonical booking events.
//!
//! Every external signal (user action, payment webhook, scheduling
//! callback, recovery redemption) is normalized into one of these before
//! it reaches the transition function.

use common::{BookingId, ClientId, SessionTypeId};
use serde::{Deserialize, Serialize};

use super::{BookingState, PaymentFailure, TimeSlot};

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    User,
    PaymentProvider,
    SchedulingProvider,
    System,
    Recovery,
}

impl EventOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOrigin::User => "user",
            EventOrigin::PaymentProvider => "payment_provider",
            EventOrigin::SchedulingProvider => "scheduling_provider",
            EventOrigin::System => "system",
            EventOrigin::Recovery => "recovery",
        }
    }
}

/// An event addressed to one booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEvent {
    /// Must match the loaded booking; mismatches are rejected.
    pub booking_id: BookingId,
    pub origin: EventOrigin,
    pub kind: BookingEventKind,
}

impl BookingEvent {
    pub fn new(booking_id: BookingId, origin: EventOrigin, kind: BookingEventKind) -> Self {
        Self {
            booking_id,
            origin,
            kind,
        }
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BookingEventKind {
    /// The client picked a session type.
    SessionTypeSelected { session_type_id: SessionTypeId },

    /// The client picked a time slot.
    TimeSelected { slot: TimeSlot },

    /// A checkout session was opened with the payment provider.
    CheckoutStarted { session_ref: String },

    /// The payment provider reported the checkout as paid.
    PaymentSucceeded { session_ref: String },

    /// The payment provider reported the checkout as expired or failed.
    PaymentFailed {
        session_ref: String,
        failure: PaymentFailure,
        reason: Option<String>,
    },

    /// The slot was confirmed, either by the scheduling provider or by the
    /// client for a free session. Provider confirmations carry their own
    /// event reference and, usually, the booked times.
    TimeConfirmed {
        event_ref: Option<String>,
        slot: Option<TimeSlot>,
    },

    /// The scheduling provider reported the event as canceled.
    SchedulingCanceled {
        event_ref: String,
        reason: Option<String>,
    },

    /// An authenticated client claimed an anonymous booking.
    ClientClaimed { client_id: ClientId },

    /// A participant cancelled the booking.
    Cancelled { reason: Option<String> },

    /// The confirmed session took place.
    SessionCompleted,

    /// The booking hold lapsed before confirmation.
    HoldExpired,

    /// A recovery token was redeemed.
    Recover { target: BookingState },
}

impl BookingEventKind {
    /// Returns the event type name.
    ///
    /// Used for logging, metrics labels, and analytics payloads.
    pub fn event_type(&self) -> &'static str {
        match self {
            BookingEventKind::SessionTypeSelected { .. } => "session_type_selected",
            BookingEventKind::TimeSelected { .. } => "time_selected",
            BookingEventKind::CheckoutStarted { .. } => "checkout_started",
            BookingEventKind::PaymentSucceeded { .. } => "payment_succeeded",
            BookingEventKind::PaymentFailed { .. } => "payment_failed",
            BookingEventKind::TimeConfirmed { .. } => "time_confirmed",
            BookingEventKind::SchedulingCanceled { .. } => "scheduling_canceled",
            BookingEventKind::ClientClaimed { .. } => "client_claimed",
            BookingEventKind::Cancelled { .. } => "cancelled",
            BookingEventKind::SessionCompleted => "session_completed",
            BookingEventKind::HoldExpired => "hold_expired",
            BookingEventKind::Recover { .. } => "recover",
        }
    }
}
