//! Actor identity extracted from request headers.
//!
//! The host's auth layer authenticates the caller and forwards the result
//! as `X-User-Id` and `X-User-Roles`. A request with neither header is
//! anonymous.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::UserId;
use orchestrator::{Actor, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// The calling actor, as supplied by the host's auth layer.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(RequestActor)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| ApiError::BadRequest(format!("{name} is not valid text"))),
    }
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let user_id = header(headers, USER_ID_HEADER)?;
    let roles = match header(headers, USER_ROLES_HEADER)? {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| r.parse::<Role>().map_err(ApiError::BadRequest))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    match user_id {
        Some(id) => Ok(Actor {
            user_id: Some(UserId::new(id)),
            roles,
        }),
        None if roles.is_empty() => Ok(Actor::anonymous()),
        None => Err(ApiError::BadRequest(format!(
            "{USER_ROLES_HEADER} requires {USER_ID_HEADER}"
        ))),
    }
}
