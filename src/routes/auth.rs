use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{error::AppError, state::SharedState, state::game::UserId};

/// Caller resolved from the `Authorization: Bearer <token>` header.
pub struct AuthenticatedUser(pub UserId);

impl FromRequestParts<SharedState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

        state
            .identity()
            .authenticate(token)
            .map(AuthenticatedUser)
            .ok_or_else(|| AppError::Unauthorized("unknown token".into()))
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
