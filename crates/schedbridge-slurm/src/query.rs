//! Job query engine.
//!
//! A listing is answered from one of two sources:
//! - the controller, when the caller asks a user's in-flight jobs
//!   (state filter within PENDING/RUNNING/SUSPENDED plus a user filter);
//! - the accounting store otherwise, with non-terminal rows augmented by a
//!   single batched reason lookup.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::accounting::{JobFilter, JobQuery, JobSort, Page, SortField, TimeRange};
use crate::adapter::{validate_identifier, SlurmAdapter};
use crate::derive::{from_live_row, Deriver};
use crate::error::{AdapterError, AdapterResult};
use crate::job::{JobField, JobInfo};
use crate::live::{supports_gpu_accounting, LiveJobFilter};
use crate::state::JobState;
use crate::tres::TresRegistry;

/// A `GetJobs` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobListRequest {
    pub accounts: Vec<String>,
    pub users: Vec<String>,
    pub states: Vec<JobState>,
    pub job_id: Option<i64>,
    pub job_name: Option<String>,
    pub submit_time: Option<TimeRange>,
    pub end_time: Option<TimeRange>,
    pub sort: Option<JobSort>,
    pub page: Option<Page>,
    /// Fields to populate; empty means all.
    pub fields: Vec<JobField>,
}

impl JobListRequest {
    /// Whether the controller answers this request.
    pub fn uses_live_path(&self) -> bool {
        !self.states.is_empty() && self.states.iter().all(JobState::is_live) && !self.users.is_empty()
    }
}

/// A `GetJobs` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<JobInfo>,
    pub total_count: u64,
    /// Store rows left out because the controller no longer knew them.
    #[serde(skip)]
    pub skipped: usize,
}

impl SlurmAdapter {
    /// List jobs.
    #[instrument(skip(self, request), fields(users = ?request.users, accounts = ?request.accounts))]
    pub async fn get_jobs(&self, request: &JobListRequest) -> AdapterResult<JobList> {
        for user in &request.users {
            validate_identifier("user", user)?;
        }
        for account in &request.accounts {
            validate_identifier("account", account)?;
        }
        if request.uses_live_path() {
            self.list_live_jobs(request).await
        } else {
            self.list_store_jobs(request).await
        }
    }

    /// A single job by id, from its most recent store record.
    #[instrument(skip(self, fields))]
    pub async fn get_job_by_id(&self, job_id: i64, fields: &[JobField]) -> AdapterResult<JobInfo> {
        let record = self
            .store
            .latest_job(job_id)
            .await?
            .ok_or(AdapterError::JobNotFound(job_id))?;
        let state = Deriver::state_of(&record)?;

        let (registry, select_type) = futures::try_join!(self.tres_registry(), self.live.select_type())?;
        let live = if state.is_terminal() {
            None
        } else {
            let mut reasons = self.live.query_pending_reasons(&[job_id]).await?;
            let status = reasons.remove(&job_id);
            if status.is_none() {
                tracing::debug!(job_id, "Controller has no entry for job; reason left empty");
            }
            status
        };

        let deriver = Deriver::new(registry, supports_gpu_accounting(&select_type), self.now());
        let user = self.identity.display_name(record.user_id);
        Ok(deriver.derive(&record, &user, live.as_ref())?.project(fields))
    }

    async fn tres_registry(&self) -> AdapterResult<TresRegistry> {
        Ok(TresRegistry::from_rows(&self.store.tres_rows().await?))
    }

    async fn list_live_jobs(&self, request: &JobListRequest) -> AdapterResult<JobList> {
        let filter = LiveJobFilter {
            users: request.users.clone(),
            accounts: request.accounts.clone(),
            partitions: Vec::new(),
            job_ids: request.job_id.into_iter().collect(),
            states: request.states.clone(),
        };
        let (rows, select_type) =
            futures::try_join!(self.live.query_jobs(&filter), self.live.select_type())?;
        let gpu_accounting = supports_gpu_accounting(&select_type);

        let rows: Vec<_> = rows
            .into_iter()
            .filter(|row| request.job_name.as_ref().is_none_or(|name| &row.name == name))
            .collect();
        let ids: Vec<i64> = rows.iter().map(|row| row.job_id).collect();
        let submit_times = self.store.submit_times(&ids).await?;

        let mut jobs: Vec<JobInfo> = rows
            .iter()
            .map(|row| {
                let submitted = submit_times.get(&row.job_id).copied().unwrap_or(0);
                from_live_row(row, submitted, gpu_accounting)
            })
            .filter(|job| in_range(job.submit_time, request.submit_time))
            .collect();
        let sort = request.sort.unwrap_or(JobSort {
            field: SortField::JobId,
            descending: false,
        });
        sort_jobs(&mut jobs, sort);

        let total_count = jobs.len() as u64;
        Ok(JobList {
            jobs: project_all(jobs, &request.fields),
            total_count,
            skipped: 0,
        })
    }

    async fn list_store_jobs(&self, request: &JobListRequest) -> AdapterResult<JobList> {
        let mut user_ids = Vec::with_capacity(request.users.len());
        for user in &request.users {
            match self.identity.uid_of(user) {
                Some(uid) => user_ids.push(uid),
                None => tracing::debug!(user = %user, "Unknown user in job filter"),
            }
        }
        if !request.users.is_empty() && user_ids.is_empty() {
            return Ok(JobList::default());
        }

        let query = JobQuery {
            filter: JobFilter {
                accounts: request.accounts.clone(),
                user_ids,
                states: request.states.clone(),
                job_id: request.job_id,
                job_name: request.job_name.clone(),
                submit_time: request.submit_time,
                end_time: request.end_time,
            },
            sort: request.sort.unwrap_or_default(),
            page: request.page,
            want_total: true,
        };
        let (page, registry, select_type) = futures::try_join!(
            self.store.query_jobs(&query),
            self.tres_registry(),
            self.live.select_type()
        )?;

        let mut live_ids = Vec::new();
        for record in &page.rows {
            if Deriver::state_of(record).is_ok_and(|s| !s.is_terminal()) {
                live_ids.push(record.job_id);
            }
        }
        let live = if live_ids.is_empty() {
            FxHashMap::default()
        } else {
            self.live.query_pending_reasons(&live_ids).await?
        };

        let deriver = Deriver::new(registry, supports_gpu_accounting(&select_type), self.now());
        let mut jobs = Vec::with_capacity(page.rows.len());
        let mut skipped = 0;
        for record in &page.rows {
            let state = match Deriver::state_of(record) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(job_id = record.job_id, error = %e, "Skipping job record");
                    skipped += 1;
                    continue;
                }
            };
            let status = live.get(&record.job_id);
            if !state.is_terminal() && status.is_none() {
                tracing::warn!(
                    job_id = record.job_id,
                    state = %state,
                    "Skipping job unknown to the controller"
                );
                skipped += 1;
                continue;
            }
            let user = self.identity.display_name(record.user_id);
            jobs.push(deriver.derive(record, &user, status)?);
        }

        Ok(JobList {
            total_count: page.total_count.unwrap_or(jobs.len() as u64),
            jobs: project_all(jobs, &request.fields),
            skipped,
        })
    }
}

fn in_range(value: i64, range: Option<TimeRange>) -> bool {
    let Some(range) = range else { return true };
    range.start.is_none_or(|start| value >= start) && range.end.is_none_or(|end| value <= end)
}

fn project_all(jobs: Vec<JobInfo>, fields: &[JobField]) -> Vec<JobInfo> {
    jobs.into_iter().map(|job| job.project(fields)).collect()
}

/// Sort jobs in memory; ties keep job id order.
pub fn sort_jobs(jobs: &mut [JobInfo], sort: JobSort) {
    jobs.sort_by(|a, b| {
        let ordering = compare(a, b, sort.field).then_with(|| a.job_id.cmp(&b.job_id));
        if sort.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare(a: &JobInfo, b: &JobInfo, field: SortField) -> Ordering {
    match field {
        SortField::JobDbInx | SortField::JobId => a.job_id.cmp(&b.job_id),
        SortField::JobName => a.name.cmp(&b.name),
        SortField::Account => a.account.cmp(&b.account),
        SortField::Partition => a.partition.cmp(&b.partition),
        SortField::State => a.state.code().cmp(&b.state.code()),
        SortField::SubmitTime => a.submit_time.cmp(&b.submit_time),
        SortField::StartTime => a.start_time.cmp(&b.start_time),
        SortField::EndTime => a.end_time.cmp(&b.end_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_path_selection() {
        let mut request = JobListRequest {
            users: vec!["alice".into()],
            states: vec![JobState::Running, JobState::Pending],
            ..Default::default()
        };
        assert!(request.uses_live_path());

        request.states.push(JobState::Completed);
        assert!(!request.uses_live_path());

        request.states = vec![];
        assert!(!request.uses_live_path());

        request.states = vec![JobState::Suspended];
        request.users.clear();
        assert!(!request.uses_live_path());
    }

    #[test]
    fn test_sort_jobs() {
        let job = |id: i64, submit: i64| JobInfo {
            job_id: id,
            submit_time: submit,
            ..Default::default()
        };
        let mut jobs = vec![job(3, 10), job(1, 30), job(2, 10)];
        sort_jobs(
            &mut jobs,
            JobSort {
                field: SortField::SubmitTime,
                descending: false,
            },
        );
        let ids: Vec<i64> = jobs.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        sort_jobs(
            &mut jobs,
            JobSort {
                field: SortField::JobId,
                descending: true,
            },
        );
        let ids: Vec<i64> = jobs.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_in_range() {
        let range = Some(TimeRange {
            start: Some(10),
            end: Some(20),
        });
        assert!(in_range(10, range));
        assert!(in_range(20, range));
        assert!(!in_range(21, range));
        assert!(in_range(5, None));
    }
}
