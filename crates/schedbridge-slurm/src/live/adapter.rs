//! `squeue`/`scontrol` backed implementation of [`SchedulerQueryPort`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use rustc_hash::FxHashMap;

use crate::error::{AdapterError, AdapterResult};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::live::parser;
use crate::live::{
    AccessList, LiveJobFilter, LiveJobRow, LiveStatus, NodeInfo, PartitionInfo, PartitionTotals,
    SchedulerQueryPort,
};
use crate::state::JobState;

/// Adapter answering live questions through the Slurm client commands.
pub struct CliSchedulerPort {
    executor: Arc<dyn CommandExecutor>,
}

impl CliSchedulerPort {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run a read-only command and fail on unreachable controller or bad exit.
    async fn run_checked(&self, spec: CommandSpec) -> AdapterResult<CommandOutput> {
        let output = self.executor.run(&spec).await?;
        parser::check_output(&spec, &output)?;
        Ok(output)
    }

    async fn show_node(&self, name: &str) -> AdapterResult<NodeInfo> {
        let spec = CommandSpec::new("scontrol").args(["show", "node", "-o", name]);
        let output = self.executor.run(&spec).await?;
        if !output.success() && output.stderr.contains("not found") {
            return Err(AdapterError::NodeNotFound(name.to_string()));
        }
        parser::check_output(&spec, &output)?;
        parser::parse_nodes(&output.stdout)
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::NodeNotFound(name.to_string()))
    }

    async fn show_partition(&self, partition: &str) -> AdapterResult<PartitionInfo> {
        let spec = CommandSpec::new("scontrol").args(["show", "partition", "-o", partition]);
        let output = self.run_checked(spec).await?;
        parser::parse_partitions(&output.stdout)
            .into_iter()
            .find(|p| p.name == partition)
            .ok_or_else(|| AdapterError::Parse {
                command: "scontrol show partition".to_string(),
                message: format!("partition {partition} missing from output"),
            })
    }
}

/// `squeue` arguments selecting the jobs of a filter.
pub(crate) fn squeue_args(filter: &LiveJobFilter) -> Vec<String> {
    let mut args = vec![
        "--noheader".to_string(),
        format!("--format={}", parser::SQUEUE_JOB_FORMAT),
    ];
    let states: Vec<&str> = if filter.states.is_empty() {
        vec!["PENDING", "RUNNING", "SUSPENDED"]
    } else {
        filter
            .states
            .iter()
            .filter(|s| s.is_live())
            .map(JobState::label)
            .collect()
    };
    args.push(format!("--states={}", states.join(",")));
    if !filter.users.is_empty() {
        args.push(format!("--user={}", filter.users.join(",")));
    }
    if !filter.accounts.is_empty() {
        args.push(format!("--account={}", filter.accounts.join(",")));
    }
    if !filter.partitions.is_empty() {
        args.push(format!("--partition={}", filter.partitions.join(",")));
    }
    if !filter.job_ids.is_empty() {
        args.push(format!("--jobs={}", join_ids(&filter.job_ids)));
    }
    args
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl SchedulerQueryPort for CliSchedulerPort {
    async fn query_nodes(&self, names: &[String]) -> AdapterResult<Vec<NodeInfo>> {
        if names.is_empty() {
            let spec = CommandSpec::new("scontrol").args(["show", "node", "-o"]);
            let output = self.run_checked(spec).await?;
            return Ok(parser::parse_nodes(&output.stdout));
        }

        // One lookup per node; every lookup is awaited before deciding the outcome.
        let results = join_all(names.iter().map(|name| self.show_node(name))).await;
        let mut nodes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(node) => nodes.push(node),
                Err(e) => failures.push(e),
            }
        }
        if failures.is_empty() {
            return Ok(nodes);
        }
        if failures.len() > 1 {
            tracing::warn!(failed = failures.len(), requested = names.len(), "Node lookups failed");
        }
        Err(failures.swap_remove(0))
    }

    async fn query_jobs(&self, filter: &LiveJobFilter) -> AdapterResult<Vec<LiveJobRow>> {
        let spec = CommandSpec::new("squeue").args(squeue_args(filter));
        let output = self.executor.run(&spec).await?;
        // squeue exits non-zero when every requested job id is gone.
        if !output.success() && output.stderr.contains("Invalid job id") {
            return Ok(Vec::new());
        }
        parser::check_output(&spec, &output)?;
        Ok(parser::parse_squeue_jobs(&output.stdout))
    }

    async fn query_partitions(&self) -> AdapterResult<Vec<PartitionInfo>> {
        let spec = CommandSpec::new("scontrol").args(["show", "partition", "-o"]);
        let output = self.run_checked(spec).await?;
        Ok(parser::parse_partitions(&output.stdout))
    }

    async fn query_partition_allow_accounts(&self, partition: &str) -> AdapterResult<AccessList> {
        Ok(self.show_partition(partition).await?.allow_accounts)
    }

    async fn query_partition_totals(&self, partition: &str) -> AdapterResult<PartitionTotals> {
        Ok(self.show_partition(partition).await?.totals)
    }

    async fn query_pending_reasons(
        &self,
        job_ids: &[i64],
    ) -> AdapterResult<FxHashMap<i64, LiveStatus>> {
        if job_ids.is_empty() {
            return Ok(FxHashMap::default());
        }
        let spec = CommandSpec::new("squeue").args([
            "--noheader".to_string(),
            format!("--format={}", parser::SQUEUE_REASON_FORMAT),
            "--states=all".to_string(),
            format!("--jobs={}", join_ids(job_ids)),
        ]);
        let output = self.executor.run(&spec).await?;
        if !output.success() && output.stderr.contains("Invalid job id") {
            return Ok(FxHashMap::default());
        }
        parser::check_output(&spec, &output)?;
        Ok(parser::parse_squeue_reasons(&output.stdout))
    }

    async fn select_type(&self) -> AdapterResult<String> {
        let spec = CommandSpec::new("scontrol").args(["show", "config"]);
        let output = self.run_checked(spec).await?;
        parser::parse_select_type(&output.stdout).ok_or_else(|| AdapterError::Parse {
            command: "scontrol show config".to_string(),
            message: "SelectType not reported".to_string(),
        })
    }
}
