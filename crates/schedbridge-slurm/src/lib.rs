//! Slurm Job, Account and Partition Management
//!
//! This crate answers job, account and cluster questions for one Slurm
//! cluster by combining two sources that are each incomplete on their own:
//! the slurmdbd accounting database (history, resources, associations) and
//! the controller (pending reasons, live elapsed time, partition ACLs).
//!
//! # Overview
//!
//! 1. **Query**: job listings are compiled into parameterised SQL against
//!    `<cluster>_job_table`, then augmented with one batched `squeue` call
//!    for non-terminal jobs. A user's in-flight jobs are read from `squeue`
//!    directly.
//! 2. **Derivation**: state codes and TRES strings become [`JobInfo`] values
//!    with requested and allocated resources, reason and elapsed time.
//! 3. **Access control**: accounts are blocked through every partition's
//!    `AllowAccounts`, users through `MaxSubmitJobs` on their association.
//!    ACL updates are serialised per cluster and re-read before writing.
//! 4. **Submission**: batch scripts are generated from a [`JobSpec`] and
//!    submitted as the requesting user.
//!
//! # Ports
//!
//! | Port | Production implementation | Backed by |
//! |------|---------------------------|-----------|
//! | [`AccountingStore`] | [`MySqlAccountingStore`] | slurmdbd MySQL/MariaDB |
//! | [`SchedulerQueryPort`] | [`CliSchedulerPort`] | `squeue`, `scontrol show` |
//! | [`SchedulerControlPort`] | [`CliSchedulerControl`] | `scontrol update`, `sacctmgr`, `sbatch`, `scancel` |
//! | [`IdentityResolver`] | [`SystemIdentity`] | passwd database |
//!
//! With the `test-util` feature, [`testing`] provides in-memory versions of
//! every port.
//!
//! # Example
//!
//! ```ignore
//! use std::{sync::Arc, time::Duration};
//! use schedbridge_slurm::*;
//!
//! let executor = Arc::new(LocalExecutor::new(Duration::from_secs(30)));
//! let store = MySqlAccountingStore::connect(url, 8, "linux", TextEncoding::default()).await?;
//! let adapter = SlurmAdapter::new(
//!     ClusterSettings::new("linux"),
//!     Arc::new(store),
//!     Arc::new(CliSchedulerPort::new(executor.clone())),
//!     Arc::new(CliSchedulerControl::new(executor)),
//!     Arc::new(SystemIdentity),
//! )?;
//!
//! adapter.block_account("acme").await?;
//! let jobs = adapter.get_jobs(&JobListRequest::default()).await?;
//! ```

pub mod accounting;
pub mod accounts;
pub mod acl;
pub mod adapter;
pub mod cluster;
pub mod control;
pub mod derive;
pub mod error;
pub mod exec;
pub mod identity;
pub mod job;
pub mod jobs;
pub mod live;
pub mod query;
pub mod state;
pub mod templates;
pub mod tres;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports
pub use accounting::{
    AccountingStore, Association, JobFilter, JobPage, JobQuery, JobRecord, JobSort,
    MySqlAccountingStore, Page, SortField, TextEncoding, TimeRange,
};
pub use accounts::{AccountWithUsers, UserStatus};
pub use acl::{AclAction, AclLocks, AclUpdate};
pub use adapter::{ClusterSettings, SlurmAdapter, validate_identifier};
pub use cluster::{NodeSummary, PartitionConfig, PartitionUsage};
pub use control::{CliSchedulerControl, SchedulerControlPort, Submission};
pub use error::{AdapterError, AdapterResult, ErrorCode};
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, LocalExecutor};
pub use identity::{IdentityResolver, SystemIdentity};
pub use job::{JobField, JobInfo, UNLIMITED_TIME_LIMIT};
pub use jobs::SubmittedJob;
pub use live::{
    AccessList, CliSchedulerPort, LiveJobFilter, LiveJobRow, LiveStatus, NodeInfo, NodeState,
    PartitionInfo, PartitionTotals, SchedulerQueryPort,
};
pub use query::{JobList, JobListRequest};
pub use state::{JobState, STATE_BASE_MASK};
pub use templates::{JobSpec, generate_batch_script};
