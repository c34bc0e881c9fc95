//! Access-control synchronisation.
//!
//! Accounts are blocked cluster-wide by removing them from every partition's
//! `AllowAccounts`, and users are blocked within an account by setting the
//! association's `MaxSubmitJobs` to 0.
//!
//! Partition ACL updates are read-modify-write cycles over several
//! partitions. They are serialised per cluster by [`AclLocks`], and the
//! basis ACL is re-read right before writing so that a change made outside
//! this process restarts the cycle instead of being overwritten.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::try_join_all;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::instrument;

use crate::adapter::{validate_identifier, SlurmAdapter};
use crate::control::{MAX_SUBMIT_BLOCKED, MAX_SUBMIT_UNLIMITED};
use crate::error::{AdapterError, AdapterResult};
use crate::live::AccessList;

/// Registry of per-cluster async locks guarding partition ACL writes.
#[derive(Debug, Default)]
pub struct AclLocks {
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AclLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ACL access to a cluster.
    pub async fn lock(&self, cluster: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(cluster.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Change applied to an account's partition access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclAction {
    Block,
    Unblock,
}

impl AclAction {
    /// ACL to write given the basis, or `None` if the basis already complies.
    ///
    /// Blocking an account under `ALL` turns the ACL into the explicit list of
    /// every other cluster account, provided by `cluster_accounts`.
    pub fn apply(
        &self,
        basis: &AccessList,
        account: &str,
        cluster_accounts: &[String],
    ) -> Option<AccessList> {
        match (self, basis) {
            (AclAction::Block, AccessList::All) => Some(AccessList::List(
                cluster_accounts
                    .iter()
                    .filter(|a| a.as_str() != account)
                    .cloned()
                    .collect(),
            )),
            (AclAction::Block, AccessList::List(names)) => {
                if names.iter().any(|n| n == account) {
                    Some(AccessList::List(
                        names.iter().filter(|n| n.as_str() != account).cloned().collect(),
                    ))
                } else {
                    None
                }
            }
            (AclAction::Unblock, AccessList::All) => None,
            (AclAction::Unblock, AccessList::List(names)) => {
                if names.iter().any(|n| n == account) {
                    None
                } else {
                    let mut names = names.clone();
                    names.push(account.to_string());
                    Some(AccessList::List(names))
                }
            }
        }
    }
}

/// Outcome of a partition ACL update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclUpdate {
    /// Partitions whose `AllowAccounts` was rewritten.
    pub partitions_written: Vec<String>,
    /// Partitions disagreed before the update.
    pub divergent: bool,
}

impl SlurmAdapter {
    /// Remove an account from every partition's `AllowAccounts`.
    #[instrument(skip(self))]
    pub async fn block_account(&self, account: &str) -> AdapterResult<AclUpdate> {
        validate_identifier("account", account)?;
        self.require_account(account).await?;
        self.update_account_acl(account, AclAction::Block).await
    }

    /// Re-admit an account to every partition.
    #[instrument(skip(self))]
    pub async fn unblock_account(&self, account: &str) -> AdapterResult<AclUpdate> {
        validate_identifier("account", account)?;
        self.require_account(account).await?;
        self.update_account_acl(account, AclAction::Unblock).await
    }

    /// Whether the account is excluded by the partition ACL.
    #[instrument(skip(self))]
    pub async fn query_account_block_status(&self, account: &str) -> AdapterResult<bool> {
        validate_identifier("account", account)?;
        self.require_account(account).await?;
        Ok(account_blocked(&self.basis_acl().await?, account))
    }

    /// Stop a user from submitting under an account.
    #[instrument(skip(self))]
    pub async fn block_user_in_account(&self, user: &str, account: &str) -> AdapterResult<()> {
        self.require_association(user, account).await?;
        self.control
            .set_max_submit_jobs(user, account, MAX_SUBMIT_BLOCKED)
            .await
    }

    /// Lift a user's submission block within an account.
    #[instrument(skip(self))]
    pub async fn unblock_user_in_account(&self, user: &str, account: &str) -> AdapterResult<()> {
        self.require_association(user, account).await?;
        self.control
            .set_max_submit_jobs(user, account, MAX_SUBMIT_UNLIMITED)
            .await
    }

    /// Whether a user is blocked within an account.
    #[instrument(skip(self))]
    pub async fn query_user_in_account_block_status(
        &self,
        user: &str,
        account: &str,
    ) -> AdapterResult<bool> {
        Ok(self.require_association(user, account).await?.is_blocked())
    }

    /// ACL of the first partition; `ALL` on a cluster without partitions.
    pub(crate) async fn basis_acl(&self) -> AdapterResult<AccessList> {
        let partitions = self.live.list_partitions().await?;
        match partitions.first() {
            Some(first) => self.live.query_partition_allow_accounts(first).await,
            None => Ok(AccessList::All),
        }
    }

    /// Apply an ACL action to every partition under the cluster's ACL lock.
    pub(crate) async fn update_account_acl(
        &self,
        account: &str,
        action: AclAction,
    ) -> AdapterResult<AclUpdate> {
        let cluster = self.settings.name.as_str();
        let _guard = self.acl_locks.lock(cluster).await;

        let attempts = self.settings.acl_max_attempts.max(1);
        for attempt in 1..=attempts {
            let partitions = self.live.list_partitions().await?;
            let Some(first) = partitions.first() else {
                tracing::warn!(cluster, "No partitions; nothing to update");
                return Ok(AclUpdate::default());
            };
            let current = try_join_all(
                partitions
                    .iter()
                    .map(|p| self.live.query_partition_allow_accounts(p)),
            )
            .await?;
            let basis = &current[0];
            let divergent = current.iter().any(|acl| acl != basis);
            if divergent {
                tracing::warn!(
                    cluster,
                    basis_partition = %first,
                    "Partition ACLs diverge; reconciling from the first partition"
                );
            }

            let cluster_accounts = match (action, basis) {
                (AclAction::Block, AccessList::All) => self.store.cluster_accounts().await?,
                _ => Vec::new(),
            };
            let desired = action
                .apply(basis, account, &cluster_accounts)
                .unwrap_or_else(|| basis.clone());
            let pending: Vec<&String> = partitions
                .iter()
                .zip(&current)
                .filter(|(_, acl)| **acl != desired)
                .map(|(p, _)| p)
                .collect();
            if pending.is_empty() {
                tracing::debug!(cluster, account, ?action, "Partition ACLs already up to date");
                return Ok(AclUpdate {
                    partitions_written: Vec::new(),
                    divergent,
                });
            }

            ensure_nonempty(&desired, account)?;

            let reread = self.live.query_partition_allow_accounts(first).await?;
            if &reread != basis {
                tracing::warn!(cluster, attempt, "Partition ACL changed concurrently; retrying");
                continue;
            }

            let mut written = Vec::with_capacity(pending.len());
            for partition in pending {
                // No rollback: earlier partitions stay updated if a later write fails.
                self.control
                    .set_partition_allow_accounts(partition, &desired)
                    .await?;
                written.push(partition.clone());
            }
            tracing::info!(
                cluster,
                account,
                ?action,
                partitions = written.len(),
                acl = %desired.render(),
                "Updated partition ACLs"
            );
            return Ok(AclUpdate {
                partitions_written: written,
                divergent,
            });
        }

        Err(AdapterError::Internal(format!(
            "partition ACL of cluster {cluster} kept changing; gave up after {attempts} attempts"
        )))
    }
}

/// Refuse an empty account list: Slurm reads `AllowAccounts=` as `ALL`.
fn ensure_nonempty(acl: &AccessList, account: &str) -> AdapterResult<()> {
    match acl {
        AccessList::List(names) if names.is_empty() => Err(AdapterError::InvalidArgument(format!(
            "cannot block account {account}: it is the only account allowed on the partitions"
        ))),
        _ => Ok(()),
    }
}

/// Whether an ACL excludes the account.
pub fn account_blocked(acl: &AccessList, account: &str) -> bool {
    !acl.admits(account)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> AccessList {
        AccessList::List(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn test_block_from_all_lists_other_accounts() {
        let accounts = vec!["acme".to_string(), "beta".to_string(), "gamma".to_string()];
        assert_eq!(
            AclAction::Block.apply(&AccessList::All, "acme", &accounts),
            Some(list(&["beta", "gamma"]))
        );
    }

    #[test]
    fn test_block_explicit() {
        assert_eq!(
            AclAction::Block.apply(&list(&["acme", "beta"]), "acme", &[]),
            Some(list(&["beta"]))
        );
        assert_eq!(AclAction::Block.apply(&list(&["beta"]), "acme", &[]), None);
    }

    #[test]
    fn test_unblock() {
        assert_eq!(AclAction::Unblock.apply(&AccessList::All, "acme", &[]), None);
        assert_eq!(
            AclAction::Unblock.apply(&list(&["beta"]), "acme", &[]),
            Some(list(&["beta", "acme"]))
        );
        assert_eq!(AclAction::Unblock.apply(&list(&["acme"]), "acme", &[]), None);
    }

    #[test]
    fn test_empty_account_list_is_refused() {
        let desired = AclAction::Block.apply(&list(&["acme"]), "acme", &[]).unwrap();
        let err = ensure_nonempty(&desired, "acme").unwrap_err();
        assert!(matches!(err, AdapterError::InvalidArgument(_)));
        assert!(ensure_nonempty(&list(&["beta"]), "acme").is_ok());
        assert!(ensure_nonempty(&AccessList::All, "acme").is_ok());
    }

    #[test]
    fn test_account_blocked() {
        assert!(!account_blocked(&AccessList::All, "acme"));
        assert!(account_blocked(&list(&["beta"]), "acme"));
        assert!(!account_blocked(&list(&["acme"]), "acme"));
    }

    #[tokio::test]
    async fn test_acl_locks_are_per_cluster() {
        let locks = Arc::new(AclLocks::new());
        let guard = locks.lock("linux").await;

        // Another cluster is not blocked.
        let other = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("gpu"))
            .await;
        assert!(other.is_ok());

        // The same cluster waits until the guard is dropped.
        let same =
            tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("linux")).await;
        assert!(same.is_err());
        drop(guard);
        let same =
            tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("linux")).await;
        assert!(same.is_ok());
    }
}
