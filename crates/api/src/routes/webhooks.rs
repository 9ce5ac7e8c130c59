//! Provider webhook endpoints.
//!
//! Providers redeliver on any non-2xx response, so only failures a retry
//! could fix return one. Illegal transitions and unknown bookings are
//! acknowledged and logged.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use booking_store::{RecordStore, TokenStore};
use domain::BookingState;
use ingest::{WebhookSource, payment, scheduling};
use orchestrator::{BookingError, ErrorKind, TransitionOutcome};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<BookingState>,
}

impl WebhookResponse {
    fn acknowledged(outcome: &'static str) -> Self {
        Self {
            received: true,
            outcome,
            state: None,
        }
    }
}

impl From<TransitionOutcome> for WebhookResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            received: true,
            outcome: outcome.outcome.as_str(),
            state: Some(outcome.current_state),
        }
    }
}

/// POST /webhooks/payment: checkout session events.
pub async fn payment<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    receive(
        &state,
        WebhookSource::Payment,
        payment::SIGNATURE_HEADER,
        &headers,
        &body,
    )
    .await
}

/// POST /webhooks/scheduling: invitee events.
pub async fn scheduling<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    receive(
        &state,
        WebhookSource::Scheduling,
        scheduling::SIGNATURE_HEADER,
        &headers,
        &body,
    )
    .await
}

#[tracing::instrument(skip(state, headers, body), fields(source = %source))]
async fn receive<S: RecordStore + TokenStore + Clone + 'static>(
    state: &AppState<S>,
    source: WebhookSource,
    signature_header: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(signature_header)
        .and_then(|value| value.to_str().ok());

    match state
        .orchestrator
        .handle_webhook(source, signature, body)
        .await
    {
        Ok(Some(outcome)) => Ok(Json(outcome.into())),
        Ok(None) => Ok(Json(WebhookResponse::acknowledged("ignored"))),
        Err(err) => acknowledge_or_fail(err),
    }
}

fn acknowledge_or_fail(err: BookingError) -> Result<Json<WebhookResponse>, ApiError> {
    match err.kind() {
        ErrorKind::UnexpectedError | ErrorKind::ConcurrencyConflict => Err(err.into()),
        _ if matches!(err, BookingError::Ingest(_)) => Err(err.into()),
        kind => {
            tracing::warn!(error = %err, kind = %kind, "Webhook acknowledged without effect");
            Ok(Json(WebhookResponse::acknowledged("rejected")))
        }
    }
}
