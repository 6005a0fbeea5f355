use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::handlers::ServerState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests that do not present one of the configured API keys.
/// With no keys configured every request passes.
pub async fn require_api_key(
    State(state): State<Arc<ServerState>>,
    req: Request,
    next: Next,
) -> Response {
    if state.api_keys.is_empty() {
        return next.run(req).await;
    }

    let verdict = presented_key(&req).map(|key| validate_api_key(&state.api_keys, key));
    match verdict {
        Some(true) => next.run(req).await,
        Some(false) => {
            tracing::warn!(path = %req.uri().path(), "Invalid API key");
            unauthorized("Invalid API key")
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "Missing API key");
            unauthorized("Missing API key")
        }
    }
}

/// Key from `X-API-Key`, falling back to `Authorization: Bearer`.
fn presented_key(req: &Request) -> Option<&str> {
    let headers = req.headers();
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

pub fn validate_api_key(valid_keys: &[String], key: &str) -> bool {
    valid_keys.iter().any(|valid| valid == key)
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configured_keys_are_valid() {
        let keys = vec!["alpha".to_string(), "beta".to_string()];
        assert!(validate_api_key(&keys, "alpha"));
        assert!(validate_api_key(&keys, "beta"));
        assert!(!validate_api_key(&keys, "gamma"));
        assert!(!validate_api_key(&keys, "Alpha"));
    }

    #[test]
    fn bearer_token_is_accepted_as_key() {
        let req = Request::builder()
            .header(AUTHORIZATION, "Bearer alpha")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(presented_key(&req), Some("alpha"));
    }

    #[test]
    fn api_key_header_wins_over_bearer() {
        let req = Request::builder()
            .header(API_KEY_HEADER, "beta")
            .header(AUTHORIZATION, "Bearer alpha")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(presented_key(&req), Some("beta"));
    }
}
