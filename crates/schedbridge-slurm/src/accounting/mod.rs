//! Accounting record source.
//!
//! [`AccountingStore`] reads the slurmdbd database: job records, the TRES
//! registry and the account/user/association tables. [`MySqlAccountingStore`]
//! is the sqlx implementation; statements for job listings are built by
//! [`query`].

mod mysql;
pub mod query;

pub use mysql::MySqlAccountingStore;
pub use query::{JobFilter, JobSort, Page, SortField, TextEncoding, TimeRange};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::AdapterResult;
use crate::tres::TresRow;

/// One row of `<cluster>_job_table`.
///
/// Time fields are Unix seconds with 0 meaning "not reached".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_db_inx: i64,
    pub job_id: i64,
    pub name: String,
    pub user_id: i64,
    pub account: String,
    pub partition: String,
    pub qos: String,
    /// Raw state code.
    pub state: i64,
    pub time_submit: i64,
    pub time_start: i64,
    pub time_end: i64,
    pub time_suspended: i64,
    /// Minutes; the store's "infinite" sentinel is kept as-is.
    pub time_limit: i64,
    pub tres_alloc: String,
    pub tres_req: String,
    pub work_dir: String,
    pub node_list: String,
}

/// A job listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    pub filter: JobFilter,
    pub sort: JobSort,
    /// `None` returns every matching row.
    pub page: Option<Page>,
    /// Also count every matching row, ignoring paging.
    pub want_total: bool,
}

/// Result of [`AccountingStore::query_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPage {
    pub rows: Vec<JobRecord>,
    pub total_count: Option<u64>,
}

/// A user ↔ account link from `<cluster>_assoc_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub user: String,
    pub account: String,
    /// Empty means every partition.
    pub partition: String,
    /// `Some(0)` blocks submission, `None` means no limit.
    pub max_submit_jobs: Option<i32>,
}

impl Association {
    pub fn is_blocked(&self) -> bool {
        self.max_submit_jobs == Some(0)
    }
}

/// Read access to the slurmdbd accounting database.
#[async_trait]
pub trait AccountingStore: Send + Sync {
    /// Job records matching a filter, sorted and paged.
    async fn query_jobs(&self, query: &JobQuery) -> AdapterResult<JobPage>;

    /// Most recent record of a job id, if any.
    async fn latest_job(&self, job_id: i64) -> AdapterResult<Option<JobRecord>>;

    /// Submit time of each job id that has a record.
    async fn submit_times(&self, job_ids: &[i64]) -> AdapterResult<FxHashMap<i64, i64>>;

    /// Rows of `tres_table`.
    async fn tres_rows(&self) -> AdapterResult<Vec<TresRow>>;

    async fn account_exists(&self, account: &str) -> AdapterResult<bool>;

    async fn user_exists(&self, user: &str) -> AdapterResult<bool>;

    /// Association of a user with an account on this cluster.
    async fn association(&self, user: &str, account: &str) -> AdapterResult<Option<Association>>;

    /// Associations of a user, one per account and partition.
    async fn user_associations(&self, user: &str) -> AdapterResult<Vec<Association>>;

    /// User associations of an account.
    async fn account_associations(&self, account: &str) -> AdapterResult<Vec<Association>>;

    /// Every account, ordered by name.
    async fn list_accounts(&self) -> AdapterResult<Vec<String>>;

    /// Accounts associated with this cluster, in order of first association.
    async fn cluster_accounts(&self) -> AdapterResult<Vec<String>>;

    /// Every QOS name, ordered by id.
    async fn qos_names(&self) -> AdapterResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_block_flag() {
        let mut assoc = Association {
            user: "alice".into(),
            account: "acme".into(),
            partition: String::new(),
            max_submit_jobs: Some(0),
        };
        assert!(assoc.is_blocked());
        assoc.max_submit_jobs = Some(5);
        assert!(!assoc.is_blocked());
        assoc.max_submit_jobs = None;
        assert!(!assoc.is_blocked());
    }
}
