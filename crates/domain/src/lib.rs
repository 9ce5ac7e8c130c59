//! Booking domain layer.
//!
//! This crate provides:
//! - The booking entity and its lifecycle states
//! - The pure `transition` function that decides every state change
//! - Side effects requested by transitions
//! - Recovery tokens for stalled bookings
//! - `BookingRepository`, the load-transition-persist cycle over a record store

pub mod booking;
pub mod clock;
pub mod error;
pub mod recovery;
pub mod repository;

pub use booking::{
    Booking, BookingEvent, BookingEventKind, BookingState, EventOrigin, NewBooking,
    NotificationKind, ParseStateError, PaymentFailure, PaymentStatus, SideEffect, TimeSlot,
    Transition, TransitionContext, TransitionError, TransitionKind, transition,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use recovery::{IssuedToken, RecoveryToken, generate_token, hash_token};
pub use repository::BookingRepository;
