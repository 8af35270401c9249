//! Optional bearer-token gate.
//!
//! - When `CURSOR_BRIDGE_API_KEY` is unset, every request passes.
//! - Otherwise every request (health and unknown paths included) must carry
//!   `Authorization: Bearer <key>` with an exact match, checked before routing.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::routes::AppState;
use super::types::ApiError;
use crate::util::constant_time_eq;

/// Extract the token from an `Authorization: Bearer <token>` header value.
fn bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token);

    match presented {
        Some(token) if constant_time_eq(token, expected) => next.run(req).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}
