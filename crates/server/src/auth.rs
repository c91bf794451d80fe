//! API-key authentication middleware.
//!
//! Every route except the health probe requires the configured key in the
//! `X-API-Key` header. A missing header is 401, a wrong key is 403. When no
//! key is configured the server runs open, which suits local development.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths that bypass authentication.
const PUBLIC_PATHS: &[&str] = &["/health"];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| path == *p)
}

fn extract_api_key(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(API_KEY_HEADER)?
        .to_str()
        .ok()
        .map(str::to_string)
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(req.uri().path()) {
        return next.run(req).await;
    }

    let Some(expected) = &state.config.server.api_key else {
        return next.run(req).await;
    };

    match extract_api_key(&req) {
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing X-API-Key header"})),
        )
            .into_response(),
        Some(provided) if provided == *expected => next.run(req).await,
        Some(_) => {
            warn!(path = req.uri().path(), "rejected request with wrong API key");
            (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "invalid API key"})),
            )
                .into_response()
        }
    }
}
