//! Schedbridge HTTP gateway
//!
//! Serves the Slurm job, account and partition operations of
//! `schedbridge-slurm` as JSON over HTTP, with bearer authentication,
//! structured logging and Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   schedbridge-server                         │
//! │                                                               │
//! │  - rest_router (rest/mod.rs)    POST /v1/<Operation>         │
//! │  - bearer_auth (rest/auth.rs)                                │
//! │  - health_router (health.rs)    GET /health, GET /metrics    │
//! │  - MeteredExecutor (metrics.rs)                              │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!                     SlurmAdapter (schedbridge-slurm)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use schedbridge_server::{AppState, Config, Metrics, RouterOptions, rest_router};
//! use schedbridge_server::rest::auth::AuthState;
//! # async fn build(adapter: schedbridge_slurm::SlurmAdapter) -> anyhow::Result<()> {
//! let config = Config::load(Some("schedbridge.yaml"))?;
//! let state = AppState {
//!     adapter,
//!     metrics: Metrics::new(),
//!     auth: AuthState::new(config.server.api_key.clone()),
//! };
//! let app = rest_router(state, &RouterOptions::default());
//! let listener = tokio::net::TcpListener::bind(config.listen_address()?).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod rest;
pub mod tracing_config;

pub use config::{Config, ConfigError};
pub use error::{ApiError, status_of};
pub use metrics::{MeteredExecutor, Metrics};
pub use rest::{AppState, RouterOptions, rest_router};
pub use tracing_config::{TracingConfig, TracingFormat, init_default_tracing, init_tracing};
