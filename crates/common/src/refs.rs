//! External correlation references.

use serde::{Deserialize, Serialize};

/// An identifier minted by a third-party provider, used to correlate
/// inbound webhooks with the booking that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ExternalRef {
    /// Payment-provider checkout session ID.
    PaymentSession(String),

    /// Scheduling-provider event ID.
    SchedulingEvent(String),
}

impl ExternalRef {
    /// Returns the provider-side identifier.
    pub fn id(&self) -> &str {
        match self {
            ExternalRef::PaymentSession(id) | ExternalRef::SchedulingEvent(id) => id,
        }
    }

    /// Returns the namespaced key used by stores to index this reference.
    ///
    /// Namespacing keeps a payment session and a scheduling event with the
    /// same raw ID from colliding.
    pub fn index_key(&self) -> String {
        match self {
            ExternalRef::PaymentSession(id) => format!("payment_session:{id}"),
            ExternalRef::SchedulingEvent(id) => format!("scheduling_event:{id}"),
        }
    }
}

impl std::fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.index_key())
    }
}
