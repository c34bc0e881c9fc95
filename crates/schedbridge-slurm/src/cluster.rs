//! Partition, node and utilisation views.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::adapter::{validate_identifier, SlurmAdapter};
use crate::error::{AdapterError, AdapterResult};
use crate::live::{AccessList, LiveJobFilter, NodeInfo, NodeState};
use crate::state::JobState;

/// Configuration of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    pub cores: i64,
    pub mem_mb: i64,
    pub nodes: i64,
    pub gpus: i64,
    /// QOS usable in the partition; `ALL` is expanded to every QOS.
    pub qos: Vec<String>,
    pub allow_accounts: AccessList,
    pub comment: String,
}

/// One node's capacity and allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    pub partitions: Vec<String>,
    pub state: String,
    pub cpus_total: i64,
    pub cpus_alloc: i64,
    pub cpus_idle: i64,
    pub mem_total_mb: i64,
    pub mem_alloc_mb: i64,
    pub gpus_total: i64,
    pub gpus_alloc: i64,
}

impl From<&NodeInfo> for NodeSummary {
    fn from(node: &NodeInfo) -> Self {
        Self {
            name: node.name.clone(),
            partitions: node.partitions.clone(),
            state: node.raw_state.clone(),
            cpus_total: node.cpus_total,
            cpus_alloc: node.cpus_alloc,
            cpus_idle: (node.cpus_total - node.cpus_alloc).max(0),
            mem_total_mb: node.mem_total_mb,
            mem_alloc_mb: node.mem_alloc_mb,
            gpus_total: node.gpus_total,
            gpus_alloc: node.gpus_alloc,
        }
    }
}

/// Usage summary of one partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionUsage {
    pub partition: String,
    pub nodes_total: i64,
    pub nodes_idle: i64,
    pub nodes_mixed: i64,
    pub nodes_allocated: i64,
    pub nodes_unavailable: i64,
    pub cpus_alloc: i64,
    pub cpus_idle: i64,
    pub gpus_alloc: i64,
    pub gpus_idle: i64,
    pub running_jobs: i64,
    pub pending_jobs: i64,
    /// Allocated share of the available cpus, in percent.
    pub utilization: f64,
}

impl SlurmAdapter {
    /// Totals, QOS, ACL and comment of every partition.
    #[instrument(skip(self))]
    pub async fn get_cluster_config(&self) -> AdapterResult<Vec<PartitionConfig>> {
        let partitions = self.live.query_partitions().await?;
        let needs_qos = partitions
            .iter()
            .any(|p| p.totals.qos == AccessList::All);
        let all_qos = if needs_qos {
            self.store.qos_names().await?
        } else {
            Vec::new()
        };

        Ok(partitions
            .into_iter()
            .map(|p| PartitionConfig {
                comment: self
                    .settings
                    .partition_comments
                    .get(&p.name)
                    .cloned()
                    .unwrap_or_default(),
                qos: match p.totals.qos {
                    AccessList::All => all_qos.clone(),
                    AccessList::List(names) => names,
                },
                name: p.name,
                cores: p.totals.cores,
                mem_mb: p.totals.mem_mb,
                nodes: p.totals.nodes,
                gpus: p.totals.gpus,
                allow_accounts: p.allow_accounts,
            })
            .collect())
    }

    /// Partitions a user may submit to under an account.
    ///
    /// A partition qualifies when the association covers it (an association
    /// without partition covers all) and its ACL admits the account.
    #[instrument(skip(self))]
    pub async fn get_available_partitions(
        &self,
        user: &str,
        account: &str,
    ) -> AdapterResult<Vec<String>> {
        validate_identifier("user", user)?;
        validate_identifier("account", account)?;
        let associations: Vec<_> = self
            .store
            .user_associations(user)
            .await?
            .into_iter()
            .filter(|a| a.account == account)
            .collect();
        if associations.is_empty() {
            return Err(AdapterError::AssociationNotFound {
                user: user.to_string(),
                account: account.to_string(),
            });
        }
        let covers_all = associations.iter().any(|a| a.partition.is_empty());

        Ok(self
            .live
            .query_partitions()
            .await?
            .into_iter()
            .filter(|p| covers_all || associations.iter().any(|a| a.partition == p.name))
            .filter(|p| p.allow_accounts.admits(account))
            .map(|p| p.name)
            .collect())
    }

    /// Per-node capacity; an empty list means every node.
    #[instrument(skip(self))]
    pub async fn get_cluster_nodes_info(&self, names: &[String]) -> AdapterResult<Vec<NodeSummary>> {
        for name in names {
            validate_identifier("node", name)?;
        }
        let nodes = self.live.query_nodes(names).await?;
        Ok(nodes.iter().map(NodeSummary::from).collect())
    }

    /// Node states, allocation and job counts per partition.
    #[instrument(skip(self))]
    pub async fn get_cluster_info(&self) -> AdapterResult<Vec<PartitionUsage>> {
        let filter = LiveJobFilter::default();
        let (partitions, nodes, jobs) = futures::try_join!(
            self.live.query_partitions(),
            self.live.query_nodes(&[]),
            self.live.query_jobs(&filter),
        )?;

        Ok(partitions
            .iter()
            .map(|partition| {
                let mut usage = PartitionUsage {
                    partition: partition.name.clone(),
                    ..Default::default()
                };
                for node in nodes.iter().filter(|n| n.partitions.contains(&partition.name)) {
                    usage.nodes_total += 1;
                    match node.state {
                        NodeState::Idle => usage.nodes_idle += 1,
                        NodeState::Mixed => usage.nodes_mixed += 1,
                        NodeState::Allocated => usage.nodes_allocated += 1,
                        NodeState::NotAvailable => {
                            usage.nodes_unavailable += 1;
                            continue;
                        }
                    }
                    usage.cpus_alloc += node.cpus_alloc;
                    usage.cpus_idle += (node.cpus_total - node.cpus_alloc).max(0);
                    usage.gpus_alloc += node.gpus_alloc;
                    usage.gpus_idle += (node.gpus_total - node.gpus_alloc).max(0);
                }
                for job in jobs.iter().filter(|j| j.partition == partition.name) {
                    match job.state {
                        JobState::Running => usage.running_jobs += 1,
                        JobState::Pending => usage.pending_jobs += 1,
                        _ => {}
                    }
                }
                usage.utilization = utilization(usage.cpus_alloc, usage.cpus_idle);
                usage
            })
            .collect())
    }
}

/// Allocated percentage rounded to two decimals; 0 without capacity.
fn utilization(alloc: i64, idle: i64) -> f64 {
    let capacity = alloc + idle;
    if capacity <= 0 {
        return 0.0;
    }
    (alloc as f64 * 10_000.0 / capacity as f64).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        assert_eq!(utilization(0, 0), 0.0);
        assert_eq!(utilization(16, 48), 25.0);
        assert_eq!(utilization(1, 2), 33.33);
        assert_eq!(utilization(8, 0), 100.0);
    }

    #[test]
    fn test_node_summary_idle_cpus() {
        let node = NodeInfo {
            name: "cn01".into(),
            partitions: vec!["compute".into()],
            raw_state: "MIXED".into(),
            state: NodeState::Mixed,
            cpus_total: 32,
            cpus_alloc: 12,
            mem_total_mb: 128_000,
            mem_alloc_mb: 48_000,
            gpus_total: 0,
            gpus_alloc: 0,
        };
        let summary = NodeSummary::from(&node);
        assert_eq!(summary.cpus_idle, 20);
        assert_eq!(summary.state, "MIXED");
    }
}
