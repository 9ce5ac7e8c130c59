//! Side effects requested by transitions.
//!
//! Effects are data. The orchestrator dispatches them after the state
//! commit; the transition function never performs I/O.

use common::BookingId;
use serde::Serialize;

use super::{Booking, BookingState};

/// Notifications sent to booking participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    PaymentFailed,
    BookingExpired,
    BookingRecovered,
    SessionCompleted,
    /// A payment succeeded for a session the booking can no longer honor.
    OrphanedPayment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingCreated => "booking_created",
            NotificationKind::BookingConfirmed => "booking_confirmed",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::BookingExpired => "booking_expired",
            NotificationKind::BookingRecovered => "booking_recovered",
            NotificationKind::SessionCompleted => "session_completed",
            NotificationKind::OrphanedPayment => "orphaned_payment",
        }
    }
}

/// A fire-and-forget action to perform after a transition commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    /// Notify the booking's participants.
    Notify {
        kind: NotificationKind,
        booking_id: BookingId,
        builder_id: String,
        client_id: Option<String>,
    },

    /// Record an analytics event.
    Track {
        name: &'static str,
        booking_id: BookingId,
        from: Option<BookingState>,
        to: BookingState,
        event: Option<&'static str>,
    },
}

impl SideEffect {
    /// Builds a notification effect for the booking's participants.
    pub fn notify(kind: NotificationKind, booking: &Booking) -> Self {
        SideEffect::Notify {
            kind,
            booking_id: booking.booking_id(),
            builder_id: booking.builder_id().to_string(),
            client_id: booking.client_id().map(|c| c.to_string()),
        }
    }

    /// Builds the analytics effect for a state change.
    pub fn state_changed(
        booking_id: BookingId,
        from: BookingState,
        to: BookingState,
        event: &'static str,
    ) -> Self {
        SideEffect::Track {
            name: "booking_state_changed",
            booking_id,
            from: Some(from),
            to,
            event: Some(event),
        }
    }

    /// Effects emitted when a booking is first created.
    pub fn for_created(booking: &Booking) -> Vec<Self> {
        vec![
            SideEffect::Track {
                name: "booking_created",
                booking_id: booking.booking_id(),
                from: None,
                to: booking.state(),
                event: None,
            },
            SideEffect::notify(NotificationKind::BookingCreated, booking),
        ]
    }

    /// Returns the sink event name, e.g. `notification.booking_confirmed`.
    pub fn event_name(&self) -> String {
        match self {
            SideEffect::Notify { kind, .. } => format!("notification.{}", kind.as_str()),
            SideEffect::Track { name, .. } => format!("analytics.{name}"),
        }
    }

    /// Returns the sink payload.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn booking_id(&self) -> BookingId {
        match self {
            SideEffect::Notify { booking_id, .. } | SideEffect::Track { booking_id, .. } => {
                *booking_id
            }
        }
    }
}
