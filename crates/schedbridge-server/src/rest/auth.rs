//! Bearer token authentication middleware for the gateway.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::types::ErrorResponse;

/// Shared authentication state.
#[derive(Clone, Default)]
pub struct AuthState {
    /// Expected API key. `None` means authentication is disabled.
    pub api_key: Option<Arc<String>>,
}

impl AuthState {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.map(Arc::new),
        }
    }
}

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(ErrorResponse {
            error: message.to_string(),
            code: "UNAUTHENTICATED".to_string(),
        }),
    )
        .into_response()
}

/// Axum middleware that validates `Authorization: Bearer <token>`.
pub async fn bearer_auth(request: Request, next: Next) -> Response {
    let auth_state = request.extensions().get::<AuthState>().cloned();

    let Some(expected_key) = auth_state.as_ref().and_then(|s| s.api_key.as_ref()) else {
        return next.run(request).await;
    };

    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => token,
        _ => return unauthorized("Missing or malformed Authorization header"),
    };

    if constant_time_eq(provided.as_bytes(), expected_key.as_bytes()) {
        next.run(request).await
    } else {
        tracing::warn!("Rejected request with invalid API key");
        unauthorized("Invalid API key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }
}
