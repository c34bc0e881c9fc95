//! Tracing subscriber setup.
//!
//! Console output for development, JSON structured logging for production.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LoggingConfig;

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output (for development).
    Console,
    /// JSON structured logging (for production).
    Json,
}

impl TracingFormat {
    fn parse(value: &str) -> Self {
        match value {
            "json" => TracingFormat::Json,
            _ => TracingFormat::Console,
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter (e.g., "info", "debug", "schedbridge_slurm=trace").
    pub log_level: String,
    /// Output format (console or JSON).
    pub format: TracingFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: TracingFormat::Console,
        }
    }
}

impl TracingConfig {
    pub fn new(log_level: String, format: TracingFormat) -> Self {
        Self { log_level, format }
    }

    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - `RUST_LOG`: Log level (default: "info")
    /// - `SCHEDBRIDGE_LOG_FORMAT`: "console" or "json" (default: "console")
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = std::env::var("SCHEDBRIDGE_LOG_FORMAT")
            .map_or(TracingFormat::Console, |f| TracingFormat::parse(&f));
        Self { log_level, format }
    }
}

impl From<&LoggingConfig> for TracingConfig {
    fn from(logging: &LoggingConfig) -> Self {
        Self {
            log_level: logging.level.clone(),
            format: TracingFormat::parse(&logging.format),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(config: TracingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.format {
        TracingFormat::Console => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .boxed(),
        TracingFormat::Json => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(format = ?config.format, "Tracing initialized");
    Ok(())
}

/// Initialize tracing with default configuration from environment.
pub fn init_default_tracing() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(TracingConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.format, TracingFormat::Console);
    }

    #[test]
    fn test_from_logging_config() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };
        let config = TracingConfig::from(&logging);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.format, TracingFormat::Json);

        assert_eq!(TracingFormat::parse("plain"), TracingFormat::Console);
    }
}
