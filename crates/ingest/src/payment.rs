//! Payment provider (Stripe-style checkout) webhook adapter.

use std::collections::HashMap;

use common::ExternalRef;
use domain::{BookingEventKind, PaymentFailure};
use serde::Deserialize;

use crate::error::Result;
use crate::event::{
    InboundEvent, WebhookAdapter, WebhookSource, parse_echoed_id, require_non_empty,
};
use crate::signature::SignatureVerifier;

/// Header carrying the payment provider's signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Deserialize)]
struct ProviderEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

impl CheckoutSession {
    fn echoed_booking_id(&self) -> Option<&str> {
        self.client_reference_id.as_deref().or_else(|| {
            self.metadata
                .as_ref()
                .and_then(|m| m.get("booking_id"))
                .map(String::as_str)
        })
    }
}

/// Translates checkout-session webhooks into payment events.
#[derive(Debug, Clone)]
pub struct PaymentAdapter {
    verifier: SignatureVerifier,
}

impl PaymentAdapter {
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self { verifier }
    }
}

impl WebhookAdapter for PaymentAdapter {
    fn source(&self) -> WebhookSource {
        WebhookSource::Payment
    }

    fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    fn normalize(&self, body: &[u8]) -> Result<Option<InboundEvent>> {
        let event: ProviderEvent = serde_json::from_slice(body)?;

        let failure = match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => None,
            "checkout.session.expired" => Some(PaymentFailure::Expired),
            "checkout.session.async_payment_failed" => Some(PaymentFailure::Failed),
            other => {
                tracing::debug!(event_type = other, "Ignoring payment event type");
                return Ok(None);
            }
        };

        let session: CheckoutSession = serde_json::from_value(event.data.object)?;
        require_non_empty(&session.id, "checkout session id")?;

        // Delayed payment methods complete the checkout before the money
        // moves; the async_payment_* event carries the outcome.
        if event.event_type == "checkout.session.completed"
            && session.payment_status.as_deref() == Some("unpaid")
        {
            tracing::debug!(session_ref = %session.id, "Checkout completed but not yet paid");
            return Ok(None);
        }

        let kind = match failure {
            None => BookingEventKind::PaymentSucceeded {
                session_ref: session.id.clone(),
            },
            Some(failure) => BookingEventKind::PaymentFailed {
                session_ref: session.id.clone(),
                failure,
                reason: Some(event.event_type.clone()),
            },
        };

        Ok(Some(InboundEvent {
            source: WebhookSource::Payment,
            echoed_booking_id: parse_echoed_id(session.echoed_booking_id()),
            reference: ExternalRef::PaymentSession(session.id),
            provider_event_type: event.event_type,
            kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IngestError;
    use chrono::{Duration, Utc};
    use common::BookingId;
    use serde_json::json;

    fn adapter() -> PaymentAdapter {
        PaymentAdapter::new(SignatureVerifier::new(["whsec_test"], Duration::minutes(5)))
    }

    fn body(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_completed_paid_session() {
        let booking_id = BookingId::new();
        let raw = body(
            "checkout.session.completed",
            json!({
                "id": "cs_123",
                "payment_status": "paid",
                "client_reference_id": booking_id.to_string()
            }),
        );
        let event = adapter().normalize(&raw).unwrap().unwrap();
        assert_eq!(
            event.kind,
            BookingEventKind::PaymentSucceeded {
                session_ref: "cs_123".to_string()
            }
        );
        assert_eq!(event.reference, ExternalRef::PaymentSession("cs_123".to_string()));
        assert_eq!(event.echoed_booking_id, Some(booking_id));
        assert_eq!(event.provider_event_type, "checkout.session.completed");
    }

    #[test]
    fn test_completed_unpaid_session_is_ignored() {
        let raw = body(
            "checkout.session.completed",
            json!({ "id": "cs_123", "payment_status": "unpaid" }),
        );
        assert!(adapter().normalize(&raw).unwrap().is_none());
    }

    #[test]
    fn test_expired_session_is_failure() {
        let booking_id = BookingId::new();
        let raw = body(
            "checkout.session.expired",
            json!({ "id": "cs_9", "metadata": { "booking_id": booking_id.to_string() } }),
        );
        let event = adapter().normalize(&raw).unwrap().unwrap();
        assert!(matches!(
            event.kind,
            BookingEventKind::PaymentFailed {
                failure: PaymentFailure::Expired,
                ..
            }
        ));
        assert_eq!(event.echoed_booking_id, Some(booking_id));
    }

    #[test]
    fn test_async_failure() {
        let raw = body("checkout.session.async_payment_failed", json!({ "id": "cs_9" }));
        let event = adapter().normalize(&raw).unwrap().unwrap();
        assert!(matches!(
            event.kind,
            BookingEventKind::PaymentFailed {
                failure: PaymentFailure::Failed,
                ..
            }
        ));
        assert_eq!(event.echoed_booking_id, None);
    }

    #[test]
    fn test_unrelated_event_type_is_ignored() {
        let raw = body("customer.created", json!({ "id": "cus_1" }));
        assert!(adapter().normalize(&raw).unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            adapter().normalize(b"not json"),
            Err(IngestError::MalformedPayload(_))
        ));
        let raw = body("checkout.session.completed", json!({ "payment_status": "paid" }));
        assert!(matches!(
            adapter().normalize(&raw),
            Err(IngestError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_ingest_verifies_before_parsing() {
        let now = Utc::now();
        let garbage = b"not json";

        let err = adapter().ingest(Some("t=1,v1=00"), garbage, now).unwrap_err();
        assert!(matches!(err, IngestError::InvalidSignature(_)));

        let raw = body(
            "checkout.session.completed",
            json!({ "id": "cs_1", "payment_status": "paid" }),
        );
        let header = SignatureVerifier::header_for("whsec_test", now.timestamp(), &raw).unwrap();
        let event = adapter().ingest(Some(&header), &raw, now).unwrap();
        assert!(event.is_some());
    }
}
