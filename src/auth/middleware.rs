//! Authentication middleware
//!
//! Validates an optional bearer token and makes the [`Actor`] available to
//! handlers. Handlers that mutate state extract `Actor` and fail with 401 when
//! no token was sent.

use crate::auth::{decode_token, Actor};
use crate::error::AppError;
use crate::state::SharedState;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

pub async fn authenticate(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|h| {
            h.to_str()
                .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))
        })
        .transpose()?;

    if let Some(header) = header {
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?;
        let claims = decode_token(token, &state.settings.auth.jwt_secret)?;
        let actor = claims.actor();
        request.extensions_mut().insert(actor);
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))
    }
}
