//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orchestrator::{BookingError, ErrorKind};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client, caught before reaching the orchestrator.
    BadRequest(String),
    /// Error returned by an orchestrator entry point.
    Booking(BookingError),
}

/// Returns the HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::InvalidSignature => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::IllegalTransition | ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::TokenExpired | ErrorKind::TokenAlreadyUsed => StatusCode::GONE,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::UnexpectedError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorKind::ValidationError, msg),
            ApiError::Booking(err) => {
                let kind = err.kind();
                if kind == ErrorKind::UnexpectedError {
                    tracing::error!(error = %err, "internal server error");
                }
                (status_for(kind), kind, err.public_message())
            }
        };

        let body = serde_json::json!({ "error": kind, "message": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}
