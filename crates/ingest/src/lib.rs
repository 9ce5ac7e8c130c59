//! Event ingestion adapters.
//!
//! Adapters turn provider webhooks and user actions into canonical booking
//! events. They verify and translate; they never touch booking state.

pub mod error;
pub mod event;
pub mod payment;
pub mod scheduling;
pub mod signature;
pub mod user;

pub use error::{IngestError, Result};
pub use event::{InboundEvent, WebhookAdapter, WebhookSource};
pub use payment::PaymentAdapter;
pub use scheduling::SchedulingAdapter;
pub use signature::SignatureVerifier;
pub use user::BookingAction;
