//! HTTP route handlers.

pub mod bookings;
pub mod ops;
pub mod webhooks;
