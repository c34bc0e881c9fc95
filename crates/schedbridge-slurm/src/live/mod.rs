//! Live snapshot of the Slurm controller.
//!
//! [`SchedulerQueryPort`] answers questions about in-flight jobs, nodes and
//! partitions with structured values. [`CliSchedulerPort`] implements it on
//! top of `squeue`/`scontrol`; the text parsing lives in [`parser`].

mod adapter;
pub mod parser;

pub use adapter::CliSchedulerPort;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::AdapterResult;
use crate::state::JobState;

/// Either the `ALL` sentinel or an explicit, ordered name list.
///
/// Used for a partition's `AllowAccounts` and `AllowQos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessList {
    All,
    List(Vec<String>),
}

impl AccessList {
    /// Parse the value printed by `scontrol` (`ALL` or `a,b,c`).
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("ALL") {
            return AccessList::All;
        }
        AccessList::List(
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether `name` is admitted.
    pub fn admits(&self, name: &str) -> bool {
        match self {
            AccessList::All => true,
            AccessList::List(names) => names.iter().any(|n| n == name),
        }
    }

    /// Value accepted by `scontrol update`.
    pub fn render(&self) -> String {
        match self {
            AccessList::All => "ALL".to_string(),
            AccessList::List(names) => names.join(","),
        }
    }
}

/// Capacity facts of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTotals {
    pub cores: i64,
    pub mem_mb: i64,
    pub nodes: i64,
    pub gpus: i64,
    pub qos: AccessList,
}

/// A partition as reported by `scontrol show partition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub name: String,
    pub allow_accounts: AccessList,
    pub totals: PartitionTotals,
    pub state: String,
}

/// Coarse node state used for utilisation summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Idle,
    Mixed,
    Allocated,
    NotAvailable,
}

impl NodeState {
    /// Classify a compound state such as `MIXED`, `IDLE+DRAIN` or `DOWN*`.
    pub fn classify(raw: &str) -> Self {
        let upper = raw.to_ascii_uppercase();
        let flags: Vec<&str> = upper
            .split('+')
            .map(|s| s.trim_end_matches(['*', '~', '#', '!', '%', '$', '@', '^', '-']))
            .collect();
        if flags.iter().any(|f| {
            matches!(
                *f,
                "DOWN" | "DRAIN" | "DRAINED" | "DRAINING" | "FAIL" | "FAILING" | "MAINT"
                    | "NOT_RESPONDING" | "POWERED_DOWN" | "POWER_DOWN" | "RESERVED" | "UNKNOWN"
                    | "FUTURE" | "INVAL"
            )
        }) {
            return NodeState::NotAvailable;
        }
        match flags.first().copied() {
            Some("IDLE") => NodeState::Idle,
            Some("MIXED") | Some("MIX") => NodeState::Mixed,
            Some("ALLOCATED") | Some("ALLOC") | Some("COMPLETING") => NodeState::Allocated,
            _ => NodeState::NotAvailable,
        }
    }
}

/// A node as reported by `scontrol show node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub partitions: Vec<String>,
    pub raw_state: String,
    pub state: NodeState,
    pub cpus_total: i64,
    pub cpus_alloc: i64,
    pub mem_total_mb: i64,
    pub mem_alloc_mb: i64,
    pub gpus_total: i64,
    pub gpus_alloc: i64,
}

/// Filter for in-flight jobs. Empty sets do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveJobFilter {
    pub users: Vec<String>,
    pub accounts: Vec<String>,
    pub partitions: Vec<String>,
    pub job_ids: Vec<i64>,
    /// Restricted to PENDING, RUNNING and SUSPENDED; empty means all three.
    pub states: Vec<JobState>,
}

/// One in-flight job from `squeue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveJobRow {
    pub job_id: i64,
    pub name: String,
    pub user: String,
    pub account: String,
    pub partition: String,
    pub qos: String,
    pub state: JobState,
    /// Requested while pending, allocated once started.
    pub node_count: i64,
    pub cpu_count: i64,
    pub gpu_count: i64,
    pub gres: String,
    pub reason: String,
    pub work_dir: String,
    pub node_list: String,
    /// Minutes; `None` for `UNLIMITED`.
    pub time_limit_minutes: Option<i64>,
    pub elapsed_seconds: i64,
    /// Unix seconds, 0 when not started.
    pub start_time: i64,
}

/// Live state and reason of one job, as returned by the batch lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStatus {
    /// `None` for transitional controller states such as `COMPLETING`.
    pub state: Option<JobState>,
    pub reason: String,
    pub elapsed_seconds: i64,
}

/// Read-only questions answered by the scheduler controller.
#[async_trait]
pub trait SchedulerQueryPort: Send + Sync {
    /// Nodes by name; an empty slice means every node.
    async fn query_nodes(&self, names: &[String]) -> AdapterResult<Vec<NodeInfo>>;

    /// In-flight jobs matching the filter.
    async fn query_jobs(&self, filter: &LiveJobFilter) -> AdapterResult<Vec<LiveJobRow>>;

    /// Every partition, in controller order.
    async fn query_partitions(&self) -> AdapterResult<Vec<PartitionInfo>>;

    /// `AllowAccounts` of one partition.
    async fn query_partition_allow_accounts(&self, partition: &str) -> AdapterResult<AccessList>;

    /// Capacity and QOS of one partition.
    async fn query_partition_totals(&self, partition: &str) -> AdapterResult<PartitionTotals>;

    /// State, reason and elapsed time of many jobs in one call.
    ///
    /// Jobs unknown to the controller are absent from the map.
    async fn query_pending_reasons(
        &self,
        job_ids: &[i64],
    ) -> AdapterResult<FxHashMap<i64, LiveStatus>>;

    /// The `SelectType` plugin of the cluster, e.g. `select/cons_tres`.
    async fn select_type(&self) -> AdapterResult<String>;

    /// Partition names, in controller order.
    async fn list_partitions(&self) -> AdapterResult<Vec<String>> {
        Ok(self
            .query_partitions()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }
}

/// Whether the select plugin records per-resource (gpu) TRES usage.
pub fn supports_gpu_accounting(select_type: &str) -> bool {
    select_type.trim().starts_with("select/cons_tres")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_list_parse() {
        assert_eq!(AccessList::parse("ALL"), AccessList::All);
        assert_eq!(AccessList::parse(" all "), AccessList::All);
        assert_eq!(
            AccessList::parse("beta,gamma"),
            AccessList::List(vec!["beta".into(), "gamma".into()])
        );
        assert_eq!(AccessList::parse(""), AccessList::List(vec![]));
    }

    #[test]
    fn test_access_list_admits_and_render() {
        let list = AccessList::parse("beta,gamma");
        assert!(list.admits("beta"));
        assert!(!list.admits("acme"));
        assert!(AccessList::All.admits("acme"));
        assert_eq!(list.render(), "beta,gamma");
        assert_eq!(AccessList::All.render(), "ALL");
    }

    #[test]
    fn test_node_state_classify() {
        assert_eq!(NodeState::classify("IDLE"), NodeState::Idle);
        assert_eq!(NodeState::classify("MIXED"), NodeState::Mixed);
        assert_eq!(NodeState::classify("ALLOCATED"), NodeState::Allocated);
        assert_eq!(NodeState::classify("IDLE+DRAIN"), NodeState::NotAvailable);
        assert_eq!(NodeState::classify("DOWN*"), NodeState::NotAvailable);
        assert_eq!(NodeState::classify("MIXED+PLANNED"), NodeState::Mixed);
        assert_eq!(NodeState::classify("idle~"), NodeState::Idle);
    }

    #[test]
    fn test_supports_gpu_accounting() {
        assert!(supports_gpu_accounting("select/cons_tres"));
        assert!(!supports_gpu_accounting("select/cons_res"));
        assert!(!supports_gpu_accounting("select/linear"));
    }
}
