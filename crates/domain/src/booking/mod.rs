//! Booking lifecycle: data model, canonical events, and the pure
//! transition function.

mod aggregate;
mod effects;
mod events;
mod state;
mod transition;
mod value_objects;

pub use aggregate::{Booking, NewBooking};
pub use effects::{NotificationKind, SideEffect};
pub use events::{BookingEvent, BookingEventKind, EventOrigin};
pub use state::{BookingState, ParseStateError, PaymentStatus};
pub use transition::{Transition, TransitionContext, TransitionKind, transition};
pub use value_objects::{PaymentFailure, TimeSlot};

use common::BookingId;
use thiserror::Error;

/// Reasons the transition function rejects an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Event for booking {actual} applied to booking {expected}")]
    BookingMismatch {
        expected: BookingId,
        actual: BookingId,
    },

    #[error("Cannot apply {event} to a booking in state {from}")]
    IllegalTransition {
        from: BookingState,
        event: &'static str,
    },

    #[error("Invalid time slot: {0}")]
    InvalidSlot(String),

    #[error("{event} requires a time slot")]
    MissingSlot { event: &'static str },

    #[error("Booking already holds {kind} {existing}, received {received}")]
    ExternalRefConflict {
        kind: &'static str,
        existing: String,
        received: String,
    },

    #[error("{0} is not a valid recovery target")]
    InvalidRecoveryTarget(BookingState),

    #[error("Booking is already claimed by another client")]
    ClientConflict,
}

impl TransitionError {
    /// Returns true for errors caused by the event not fitting the current
    /// lifecycle, as opposed to malformed input.
    pub fn is_illegal_transition(&self) -> bool {
        matches!(
            self,
            TransitionError::IllegalTransition { .. }
                | TransitionError::ExternalRefConflict { .. }
                | TransitionError::ClientConflict
        )
    }
}
