//! Prometheus metrics for monitoring the gateway.
//!
//! This module tracks:
//! - RPC calls by method and outcome code
//! - RPC request duration
//! - Failed external commands by program
//! - Partition ACL writes
//! - Job rows skipped because the controller no longer knew them

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramVec, IntCounter, TextEncoder, register_counter_vec,
    register_histogram_vec, register_int_counter,
};
use schedbridge_slurm::{AdapterResult, CommandExecutor, CommandOutput, CommandSpec};

lazy_static! {
    /// Counter for RPC calls, labeled by method and result code
    pub static ref RPC_CALLS: CounterVec = register_counter_vec!(
        "schedbridge_rpc_calls_total",
        "Total number of RPC calls",
        &["method", "code"]
    )
    .unwrap();

    /// Histogram for RPC request duration in milliseconds
    pub static ref RPC_DURATION: HistogramVec = register_histogram_vec!(
        "schedbridge_rpc_duration_milliseconds",
        "RPC request duration in milliseconds",
        &["method"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 30000.0]
    )
    .unwrap();

    /// Counter for external commands that failed or exited non-zero, labeled by program
    pub static ref COMMAND_FAILURES: CounterVec = register_counter_vec!(
        "schedbridge_command_failures_total",
        "Total number of failed scheduler commands",
        &["program"]
    )
    .unwrap();

    /// Counter for partition AllowAccounts rewrites
    pub static ref ACL_WRITES: IntCounter = register_int_counter!(
        "schedbridge_acl_writes_total",
        "Total number of partition ACL writes"
    )
    .unwrap();

    /// Counter for job rows left out of listings
    pub static ref SKIPPED_JOB_ROWS: IntCounter = register_int_counter!(
        "schedbridge_skipped_job_rows_total",
        "Job rows skipped because the controller had no entry for them"
    )
    .unwrap();
}

/// Metrics recorder for the gateway.
///
/// The actual metrics are stored in global static variables (`lazy_static`).
#[derive(Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished RPC call.
    pub fn record_rpc(&self, method: &str, code: &str, duration_ms: u64) {
        RPC_CALLS.with_label_values(&[method, code]).inc();
        RPC_DURATION
            .with_label_values(&[method])
            .observe(duration_ms as f64);
    }

    pub fn record_command_failure(&self, program: &str) {
        COMMAND_FAILURES.with_label_values(&[program]).inc();
    }

    pub fn record_acl_writes(&self, partitions: usize) {
        ACL_WRITES.inc_by(partitions as u64);
    }

    pub fn record_skipped_rows(&self, rows: usize) {
        SKIPPED_JOB_ROWS.inc_by(rows as u64);
    }

    /// Get current metrics as Prometheus text format.
    pub fn export(&self) -> Result<String, std::fmt::Error> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|_| std::fmt::Error)?;

        String::from_utf8(buffer).map_err(|_| std::fmt::Error)
    }
}

/// Executor wrapper counting failed commands.
pub struct MeteredExecutor {
    inner: Arc<dyn CommandExecutor>,
    metrics: Metrics,
}

impl MeteredExecutor {
    pub fn new(inner: Arc<dyn CommandExecutor>, metrics: Metrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl CommandExecutor for MeteredExecutor {
    async fn run(&self, spec: &CommandSpec) -> AdapterResult<CommandOutput> {
        let result = self.inner.run(spec).await;
        if !result.as_ref().is_ok_and(CommandOutput::success) {
            self.metrics.record_command_failure(&spec.program);
        }
        result
    }
}
