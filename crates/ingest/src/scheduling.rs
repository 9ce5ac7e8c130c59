//! Scheduling provider (Calendly-style) webhook adapter.

use chrono::{DateTime, Utc};
use common::ExternalRef;
use domain::{BookingEventKind, TimeSlot};
use serde::Deserialize;

use crate::error::Result;
use crate::event::{
    InboundEvent, WebhookAdapter, WebhookSource, parse_echoed_id, require_non_empty,
};
use crate::signature::SignatureVerifier;

/// Header carrying the scheduling provider's signature.
pub const SIGNATURE_HEADER: &str = "Calendly-Webhook-Signature";

/// Timezone assumed when the provider omits the invitee's.
const FALLBACK_TIMEZONE: &str = "UTC";

#[derive(Debug, Deserialize)]
struct ProviderEvent {
    event: String,
    payload: InviteePayload,
}

#[derive(Debug, Deserialize)]
struct InviteePayload {
    #[serde(default)]
    timezone: Option<String>,
    scheduled_event: ScheduledEvent,
    #[serde(default)]
    tracking: Option<Tracking>,
    #[serde(default)]
    cancellation: Option<Cancellation>,
}

#[derive(Debug, Deserialize)]
struct ScheduledEvent {
    uri: String,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Tracking {
    #[serde(default)]
    utm_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cancellation {
    #[serde(default)]
    reason: Option<String>,
}

/// Translates invitee webhooks into scheduling events.
///
/// The provider does not echo our booking ID by default; bookings are found
/// through the scheduled event URI, or through `tracking.utm_content` when
/// the booking link was generated with it.
#[derive(Debug, Clone)]
pub struct SchedulingAdapter {
    verifier: SignatureVerifier,
}

impl SchedulingAdapter {
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self { verifier }
    }
}

impl WebhookAdapter for SchedulingAdapter {
    fn source(&self) -> WebhookSource {
        WebhookSource::Scheduling
    }

    fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    fn normalize(&self, body: &[u8]) -> Result<Option<InboundEvent>> {
        let envelope: serde_json::Value = serde_json::from_slice(body)?;
        let event_type = envelope
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if !matches!(event_type, "invitee.created" | "invitee.canceled") {
            tracing::debug!(event_type, "Ignoring scheduling event type");
            return Ok(None);
        }

        let event: ProviderEvent = serde_json::from_value(envelope)?;
        let payload = event.payload;
        let event_ref = payload.scheduled_event.uri;
        require_non_empty(&event_ref, "scheduled event uri")?;

        let kind = if event.event == "invitee.created" {
            let slot = match (
                payload.scheduled_event.start_time,
                payload.scheduled_event.end_time,
            ) {
                (Some(start_time), Some(end_time)) => Some(TimeSlot {
                    start_time,
                    end_time,
                    client_timezone: payload
                        .timezone
                        .filter(|tz| !tz.trim().is_empty())
                        .unwrap_or_else(|| FALLBACK_TIMEZONE.to_string()),
                }),
                _ => None,
            };
            BookingEventKind::TimeConfirmed {
                event_ref: Some(event_ref.clone()),
                slot,
            }
        } else {
            BookingEventKind::SchedulingCanceled {
                event_ref: event_ref.clone(),
                reason: payload.cancellation.and_then(|c| c.reason),
            }
        };

        let echoed = payload.tracking.and_then(|t| t.utm_content);
        Ok(Some(InboundEvent {
            source: WebhookSource::Scheduling,
            provider_event_type: event.event,
            reference: ExternalRef::SchedulingEvent(event_ref),
            echoed_booking_id: parse_echoed_id(echoed.as_deref()),
            kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IngestError;
    use chrono::{Duration, TimeZone};
    use common::BookingId;
    use serde_json::json;

    const EVENT_URI: &str = "https://api.calendly.com/scheduled_events/EV123";

    fn adapter() -> SchedulingAdapter {
        SchedulingAdapter::new(SignatureVerifier::new(["cal_key"], Duration::minutes(5)))
    }

    #[test]
    fn test_invitee_created_confirms_time() {
        let booking_id = BookingId::new();
        let raw = serde_json::to_vec(&json!({
            "event": "invitee.created",
            "payload": {
                "timezone": "Europe/Berlin",
                "scheduled_event": {
                    "uri": EVENT_URI,
                    "start_time": "2026-05-01T09:00:00Z",
                    "end_time": "2026-05-01T10:00:00Z"
                },
                "tracking": { "utm_content": booking_id.to_string() }
            }
        }))
        .unwrap();

        let event = adapter().normalize(&raw).unwrap().unwrap();
        let BookingEventKind::TimeConfirmed { event_ref, slot } = event.kind else {
            panic!("expected TimeConfirmed");
        };
        assert_eq!(event_ref.as_deref(), Some(EVENT_URI));
        let slot = slot.unwrap();
        assert_eq!(
            slot.start_time,
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(slot.client_timezone, "Europe/Berlin");
        assert_eq!(event.echoed_booking_id, Some(booking_id));
        assert_eq!(
            event.reference,
            ExternalRef::SchedulingEvent(EVENT_URI.to_string())
        );
    }

    #[test]
    fn test_missing_timezone_falls_back() {
        let raw = serde_json::to_vec(&json!({
            "event": "invitee.created",
            "payload": {
                "scheduled_event": {
                    "uri": EVENT_URI,
                    "start_time": "2026-05-01T09:00:00Z",
                    "end_time": "2026-05-01T10:00:00Z"
                }
            }
        }))
        .unwrap();
        let event = adapter().normalize(&raw).unwrap().unwrap();
        let BookingEventKind::TimeConfirmed { slot, .. } = event.kind else {
            panic!("expected TimeConfirmed");
        };
        assert_eq!(slot.unwrap().client_timezone, "UTC");
        assert_eq!(event.echoed_booking_id, None);
    }

    #[test]
    fn test_invitee_canceled() {
        let raw = serde_json::to_vec(&json!({
            "event": "invitee.canceled",
            "payload": {
                "scheduled_event": { "uri": EVENT_URI },
                "cancellation": { "reason": "conflict" }
            }
        }))
        .unwrap();
        let event = adapter().normalize(&raw).unwrap().unwrap();
        assert_eq!(
            event.kind,
            BookingEventKind::SchedulingCanceled {
                event_ref: EVENT_URI.to_string(),
                reason: Some("conflict".to_string()),
            }
        );
    }

    #[test]
    fn test_other_events_are_ignored() {
        let raw = br#"{"event":"routing_form_submission.created","payload":{}}"#;
        assert!(adapter().normalize(raw).unwrap().is_none());
    }

    #[test]
    fn test_missing_scheduled_event_is_malformed() {
        let raw = br#"{"event":"invitee.created","payload":{}}"#;
        assert!(matches!(
            adapter().normalize(raw),
            Err(IngestError::MalformedPayload(_))
        ));
    }
}
