//! Health check and metrics HTTP endpoints.
//!
//! - /health - Basic liveness check
//! - /metrics - Prometheus metrics in text format
//!
//! Both are served without authentication.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::time::SystemTime;

use crate::metrics::Metrics;
use crate::rest::types::HealthResponse;

/// Server uptime tracker.
static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

/// Initialize the start time (call once at server startup).
pub fn init_start_time() {
    START_TIME.get_or_init(SystemTime::now);
}

/// Get server uptime in seconds.
fn get_uptime_seconds() -> u64 {
    START_TIME
        .get()
        .and_then(|start| SystemTime::now().duration_since(*start).ok())
        .map_or(0, |d| d.as_secs())
}

/// Handler for GET /health
///
/// Returns 200 whenever the process is serving; the scheduler and the
/// accounting store are not probed.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: get_uptime_seconds(),
    })
}

/// Handler for GET /metrics
async fn metrics_handler(State(metrics): State<Metrics>) -> Response {
    match metrics.export() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to export metrics".to_string(),
        )
            .into_response(),
    }
}

/// Create the health check router; `/metrics` is left out when disabled.
pub fn health_router(metrics: Metrics, metrics_enabled: bool) -> Router {
    let router = Router::new().route("/health", get(health_handler));
    let router = if metrics_enabled {
        router.route("/metrics", get(metrics_handler))
    } else {
        router
    };
    router.with_state(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_uptime() {
        init_start_time();
        let uptime = get_uptime_seconds();
        assert!(uptime < 1_000_000);
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.3.0".to_string(),
            uptime_seconds: 42,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("\"uptime_seconds\":42"));
    }
}
