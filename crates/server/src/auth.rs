use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::error::ApiError;

/// The calling user, taken from the `X-User-Id` header the API gateway
/// stamps after verifying the session. This service never sees credentials.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_user_header(parts).ok_or(ApiError::MissingUserHeader)
    }
}

/// Routes that personalize but do not require a caller take
/// `Option<AuthUser>`; a missing or malformed header is simply `None`.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parse_user_header(parts))
    }
}

fn parse_user_header(parts: &Parts) -> Option<AuthUser> {
    parts
        .headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Uuid>().ok())
        .map(AuthUser)
}
