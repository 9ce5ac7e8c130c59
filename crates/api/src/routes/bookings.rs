//! Booking endpoints: creation, reads, user actions, and recovery.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use booking_store::{RecordStore, TokenStore};
use chrono::{DateTime, Utc};
use common::BookingId;
use domain::{Booking, BookingState, IssuedToken, PaymentFailure, PaymentStatus};
use ingest::BookingAction;
use orchestrator::{CreateBooking, CreatedBooking, ErrorKind, RecoveryResult, TransitionOutcome};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::actor::RequestActor;
use crate::error::ApiError;

const RECOVERY_FAILED_MESSAGE: &str = "could not recover booking";

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct IssueTokenRequest {
    #[serde(default)]
    pub target_state: Option<BookingState>,
}

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    pub token: String,
    #[serde(default)]
    pub target_state: Option<BookingState>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: BookingId,
    pub builder_id: String,
    pub client_id: Option<String>,
    pub session_type_id: String,
    pub state: BookingState,
    pub payment_status: PaymentStatus,
    pub payment_required: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub client_timezone: Option<String>,
    pub last_payment_failure: Option<PaymentFailure>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.booking_id(),
            builder_id: booking.builder_id().to_string(),
            client_id: booking.client_id().map(|c| c.to_string()),
            session_type_id: booking.session_type_id().to_string(),
            state: booking.state(),
            payment_status: booking.payment_status(),
            payment_required: booking.payment_required(),
            start_time: booking.start_time(),
            end_time: booking.end_time(),
            client_timezone: booking.client_timezone().map(String::from),
            last_payment_failure: booking.last_payment_failure(),
            cancellation_reason: booking.cancellation_reason().map(String::from),
            created_at: booking.created_at(),
            updated_at: booking.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    #[serde(flatten)]
    pub result: RecoveryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

// -- Handlers --

/// POST /bookings: create a booking, or return the existing one for a
/// supplied ID.
#[tracing::instrument(skip(state, actor, req))]
pub async fn create<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestActor(actor): RequestActor,
    Json(req): Json<CreateBooking>,
) -> Result<(StatusCode, Json<CreatedBooking>), ApiError> {
    let created = state.orchestrator.create_booking(&actor, req).await?;
    let status = if created.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(created)))
}

/// GET /bookings/{id}: read a booking.
#[tracing::instrument(skip(state, actor))]
pub async fn get<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let booking = state.orchestrator.get_booking(&actor, booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// POST /bookings/{id}/actions: apply a user action.
#[tracing::instrument(skip(state, actor, action))]
pub async fn apply_action<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    Json(action): Json<BookingAction>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let outcome = state
        .orchestrator
        .apply_action(&actor, booking_id, action)
        .await?;
    Ok(Json(outcome))
}

/// POST /bookings/{id}/expire: release an abandoned hold.
#[tracing::instrument(skip(state, actor))]
pub async fn expire<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let outcome = state.orchestrator.expire_booking(&actor, booking_id).await?;
    Ok(Json(outcome))
}

/// POST /bookings/{id}/recovery-token: issue a single-use recovery token.
#[tracing::instrument(skip(state, actor, req))]
pub async fn issue_recovery_token<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    Json(req): Json<IssueTokenRequest>,
) -> Result<(StatusCode, Json<IssuedToken>), ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let issued = state
        .orchestrator
        .issue_recovery_token(&actor, booking_id, req.target_state)
        .await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// POST /recover: redeem a recovery token.
///
/// Failures share one body so callers cannot probe which tokens exist.
#[tracing::instrument(skip(state, req))]
pub async fn recover<S: RecordStore + TokenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RecoverRequest>,
) -> (StatusCode, Json<RecoverResponse>) {
    let result = state
        .orchestrator
        .recover_booking_with_token(&req.token, req.target_state)
        .await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) if e.kind() == ErrorKind::UnexpectedError => {
            tracing::error!(error = %e, "recovery failed unexpectedly");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            tracing::info!(error = %e, kind = %e.kind(), "recovery refused");
            StatusCode::BAD_REQUEST
        }
    };

    let response = RecoverResponse {
        result: RecoveryResult::from(&result),
        message: result.is_err().then_some(RECOVERY_FAILED_MESSAGE),
    };
    (status, Json(response))
}

fn parse_booking_id(id: &str) -> Result<BookingId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid booking id: {id}")))
}
