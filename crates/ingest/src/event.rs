//! Canonical inbound event shape and the webhook adapter seam.

use chrono::{DateTime, Utc};
use common::{BookingId, ExternalRef};
use domain::{BookingEvent, BookingEventKind, EventOrigin};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::signature::SignatureVerifier;

/// Which provider sent a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    Payment,
    Scheduling,
}

impl WebhookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookSource::Payment => "payment",
            WebhookSource::Scheduling => "scheduling",
        }
    }

    pub fn origin(&self) -> EventOrigin {
        match self {
            WebhookSource::Payment => EventOrigin::PaymentProvider,
            WebhookSource::Scheduling => EventOrigin::SchedulingProvider,
        }
    }
}

impl std::fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified provider event, translated but not yet bound to a booking.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub source: WebhookSource,

    /// The provider's own event type, e.g. `checkout.session.completed`.
    pub provider_event_type: String,

    /// The correlation key carried by the event.
    pub reference: ExternalRef,

    /// A booking ID the provider echoed back, if any. Only used when the
    /// reference is not yet indexed.
    pub echoed_booking_id: Option<BookingId>,

    pub kind: BookingEventKind,
}

impl InboundEvent {
    /// Binds the event to the booking it was resolved to.
    pub fn into_event(self, booking_id: BookingId) -> BookingEvent {
        BookingEvent::new(booking_id, self.source.origin(), self.kind)
    }
}

/// Verifies and translates one provider's webhooks.
pub trait WebhookAdapter: Send + Sync {
    fn source(&self) -> WebhookSource;

    fn verifier(&self) -> &SignatureVerifier;

    /// Translates a verified payload. Returns `None` for event types that
    /// do not affect bookings.
    fn normalize(&self, body: &[u8]) -> Result<Option<InboundEvent>>;

    /// Verifies the signature, then translates the payload.
    ///
    /// The body is never parsed before the signature checks out.
    fn ingest(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<InboundEvent>> {
        let key_index = self.verifier().verify(signature_header, body, now)?;
        if key_index > 0 {
            tracing::info!(
                source = %self.source(),
                key_index,
                "Webhook verified with a non-primary key"
            );
        }
        self.normalize(body)
    }
}

/// Parses an optional echoed booking ID, ignoring values that are not IDs.
pub(crate) fn parse_echoed_id(raw: Option<&str>) -> Option<BookingId> {
    let raw = raw?.trim();
    match raw.parse::<BookingId>() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::debug!(value = raw, "Ignoring echoed value that is not a booking id");
            None
        }
    }
}

pub(crate) fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(IngestError::MalformedPayload(format!("{field} is empty")));
    }
    Ok(())
}
