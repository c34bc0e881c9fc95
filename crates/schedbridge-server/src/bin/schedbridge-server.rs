//! Schedbridge gateway binary.
//!
//! Connects to the slurmdbd accounting database, drives the Slurm command
//! line tools on this host and serves the operations over HTTP/JSON.
//!
//! # Configuration
//!
//! A YAML file (`--config`) overridden by `SCHEDBRIDGE_*` environment
//! variables, for example:
//!
//! - `SCHEDBRIDGE_DATABASE_URL` - slurmdbd MySQL URL (required)
//! - `SCHEDBRIDGE_CLUSTER`      - Cluster name (required)
//! - `SCHEDBRIDGE_API_KEY`      - Bearer token for authentication
//! - `SCHEDBRIDGE_ADDRESS`      - Listen address (default `0.0.0.0:8972`)
//!
//! # Usage
//!
//! ```bash
//! SCHEDBRIDGE_DATABASE_URL=mysql://slurm:pw@db/slurm_acct_db \
//!   SCHEDBRIDGE_CLUSTER=linux schedbridge-server --config /etc/schedbridge.yaml
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use schedbridge_server::rest::auth::AuthState;
use schedbridge_server::{
    AppState, Config, MeteredExecutor, Metrics, RouterOptions, TracingConfig, health,
    init_tracing, rest_router,
};
use schedbridge_slurm::{
    CliSchedulerControl, CliSchedulerPort, CommandExecutor, LocalExecutor, MySqlAccountingStore,
    SlurmAdapter, SystemIdentity,
};
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "schedbridge-server")]
#[command(author, version, about = "HTTP gateway for Slurm job and account management")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SCHEDBRIDGE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    init_tracing(TracingConfig::from(&config.observability.logging))
        .map_err(|e| anyhow::anyhow!("initializing tracing: {e}"))?;
    health::init_start_time();

    info!(cluster = %config.cluster.name, "Starting schedbridge server");

    if config.server.api_key.is_some() {
        info!("API key authentication enabled");
    } else {
        warn!(
            "No API key configured (SCHEDBRIDGE_API_KEY). Server is unauthenticated. \
             Deploy behind an authenticating reverse proxy."
        );
    }

    let metrics = Metrics::new();
    let executor: Arc<dyn CommandExecutor> = Arc::new(MeteredExecutor::new(
        Arc::new(LocalExecutor::new(config.command_timeout())),
        metrics.clone(),
    ));

    let store = MySqlAccountingStore::connect(
        &config.store.url,
        config.store.pool_size,
        &config.cluster.name,
        config.store.text_encoding,
    )
    .await
    .context("connecting to the accounting store")?;

    let adapter = SlurmAdapter::new(
        config.cluster_settings(),
        Arc::new(store),
        Arc::new(CliSchedulerPort::new(executor.clone())),
        Arc::new(CliSchedulerControl::new(executor)),
        Arc::new(SystemIdentity),
    )?;

    let state = AppState {
        adapter,
        metrics,
        auth: AuthState::new(config.server.api_key.clone()),
    };
    let options = RouterOptions {
        cors_origins: config.server.cors_origins.clone(),
        request_timeout: config.request_timeout(),
        metrics_enabled: config.observability.metrics_enabled,
    };
    let app = rest_router(state, &options);

    // Graceful shutdown
    let shutdown = Arc::new(Notify::new());
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.notify_one();
    });

    let addr = config.listen_address()?;
    info!("Listening on {addr}");
    info!("CORS origins: {}", options.cors_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
