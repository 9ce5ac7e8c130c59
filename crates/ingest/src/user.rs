//! User-initiated booking actions.

use chrono::{DateTime, Utc};
use common::{BookingId, ClientId, SessionTypeId};
use domain::{BookingEvent, BookingEventKind, EventOrigin, TimeSlot};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// An action a signed-in or anonymous user takes on a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BookingAction {
    SelectSessionType {
        session_type_id: SessionTypeId,
    },
    SelectTime {
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        client_timezone: String,
    },
    StartCheckout {
        session_ref: String,
    },
    ConfirmFreeSession,
    Claim,
    Cancel {
        #[serde(default)]
        reason: Option<String>,
    },
    Complete,
}

impl BookingAction {
    /// Returns the action name.
    pub fn name(&self) -> &'static str {
        match self {
            BookingAction::SelectSessionType { .. } => "select_session_type",
            BookingAction::SelectTime { .. } => "select_time",
            BookingAction::StartCheckout { .. } => "start_checkout",
            BookingAction::ConfirmFreeSession => "confirm_free_session",
            BookingAction::Claim => "claim",
            BookingAction::Cancel { .. } => "cancel",
            BookingAction::Complete => "complete",
        }
    }

    /// Translates the action into a booking event.
    ///
    /// `claimant` is the acting client; only `Claim` needs one.
    pub fn into_event(
        self,
        booking_id: BookingId,
        claimant: Option<ClientId>,
    ) -> Result<BookingEvent> {
        let kind = match self {
            BookingAction::SelectSessionType { session_type_id } => {
                BookingEventKind::SessionTypeSelected { session_type_id }
            }
            BookingAction::SelectTime {
                start_time,
                end_time,
                client_timezone,
            } => BookingEventKind::TimeSelected {
                slot: TimeSlot {
                    start_time,
                    end_time,
                    client_timezone,
                },
            },
            BookingAction::StartCheckout { session_ref } => {
                if session_ref.trim().is_empty() {
                    return Err(IngestError::InvalidAction(
                        "session_ref is required".to_string(),
                    ));
                }
                BookingEventKind::CheckoutStarted { session_ref }
            }
            BookingAction::ConfirmFreeSession => BookingEventKind::TimeConfirmed {
                event_ref: None,
                slot: None,
            },
            BookingAction::Claim => {
                let client_id = claimant.ok_or_else(|| {
                    IngestError::InvalidAction("claim requires a signed-in client".to_string())
                })?;
                BookingEventKind::ClientClaimed { client_id }
            }
            BookingAction::Cancel { reason } => BookingEventKind::Cancelled { reason },
            BookingAction::Complete => BookingEventKind::SessionCompleted,
        };
        Ok(BookingEvent::new(booking_id, EventOrigin::User, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_tagged_actions() {
        let action: BookingAction = serde_json::from_value(json!({
            "action": "select_time",
            "start_time": "2026-05-01T09:00:00Z",
            "end_time": "2026-05-01T10:00:00Z",
            "client_timezone": "Asia/Tokyo"
        }))
        .unwrap();
        assert_eq!(action.name(), "select_time");

        let action: BookingAction = serde_json::from_value(json!({ "action": "cancel" })).unwrap();
        assert_eq!(action, BookingAction::Cancel { reason: None });
    }

    #[test]
    fn test_select_time_builds_slot() {
        let booking_id = BookingId::new();
        let action: BookingAction = serde_json::from_value(json!({
            "action": "select_time",
            "start_time": "2026-05-01T09:00:00Z",
            "end_time": "2026-05-01T10:00:00Z",
            "client_timezone": "Asia/Tokyo"
        }))
        .unwrap();
        let event = action.into_event(booking_id, None).unwrap();
        assert_eq!(event.booking_id, booking_id);
        assert_eq!(event.origin, EventOrigin::User);
        assert_eq!(event.event_type(), "time_selected");
    }

    #[test]
    fn test_claim_requires_client() {
        let booking_id = BookingId::new();
        assert!(matches!(
            BookingAction::Claim.into_event(booking_id, None),
            Err(IngestError::InvalidAction(_))
        ));
        let event = BookingAction::Claim
            .into_event(booking_id, Some(ClientId::new("c1")))
            .unwrap();
        assert_eq!(
            event.kind,
            BookingEventKind::ClientClaimed {
                client_id: ClientId::new("c1")
            }
        );
    }

    #[test]
    fn test_start_checkout_requires_session() {
        let result = BookingAction::StartCheckout {
            session_ref: " ".to_string(),
        }
        .into_event(BookingId::new(), None);
        assert!(result.is_err());
    }
}
