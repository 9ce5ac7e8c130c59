//! Shared identifier types for the booking workspace.

pub mod refs;
pub mod types;

pub use refs::ExternalRef;
pub use types::{BookingId, BuilderId, ClientId, SessionTypeId, UserId};
