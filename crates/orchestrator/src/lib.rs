//! Booking orchestration layer.
//!
//! `BookingOrchestrator` is the only component that changes bookings. Every
//! entry point runs the same cycle: load, authorize, transition, persist
//! with compare-and-swap, then hand side effects to a sink without waiting.

pub mod auth;
pub mod config;
pub mod effects;
pub mod error;
pub mod orchestrator;

pub use auth::{Action, Actor, Authorizer, OwnershipPolicy, Role};
pub use config::OrchestratorConfig;
pub use effects::{EffectSink, RecordingSink, SinkError, TracingSink, dispatch};
pub use error::{BookingError, ErrorKind, Result};
pub use orchestrator::{
    BookingOrchestrator, CreateBooking, CreatedBooking, RecoveryResult, TransitionOutcome,
};
