//! Bearer token middleware for console routes.
//!
//! Tokens come from `POST /api/auth/mpin` and are accepted from:
//! 1. **Authorization header**: `Authorization: Bearer <token>` - REST calls
//! 2. **Query parameter**: `?token=<token>` - WebSocket upgrades, which can't set headers

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::HttpSharedState;

/// `Authorization: Bearer <token>`, if present and well-formed.
pub(crate) fn extract_bearer_token<B>(req: &axum::http::Request<B>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// `?token=<value>` from the query string.
///
/// - `/ws/events?token=abc123` -> Some("abc123")
/// - `/ws/events?foo=bar&token=abc123` -> Some("abc123")
/// - `/ws/events?foo=bar` -> None
fn extract_query_token<B>(req: &axum::http::Request<B>) -> Option<String> {
    req.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "token").then(|| value.to_string())
        })
    })
}

pub async fn auth_middleware(
    State(state): State<Arc<HttpSharedState>>,
    req: Request,
    next: Next,
) -> Response {
    let query_token = extract_query_token(&req);
    let token = extract_bearer_token(&req).or(query_token.as_deref());

    if state.validate_token(token) {
        next.run(req).await
    } else {
        log::debug!("Rejected unauthenticated request to {}", req.uri().path());
        (
            StatusCode::UNAUTHORIZED,
            "Invalid or missing authentication token",
        )
            .into_response()
    }
}
