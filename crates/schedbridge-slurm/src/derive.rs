//! State and resource derivation.
//!
//! Turns a raw [`JobRecord`] (state code and TRES strings) plus the live
//! controller view into a [`JobInfo`].

use crate::accounting::JobRecord;
use crate::error::{AdapterError, AdapterResult};
use crate::job::{normalize_time_limit, JobInfo};
use crate::live::{LiveJobRow, LiveStatus};
use crate::state::JobState;
use crate::tres::TresRegistry;

/// Reason reported for running jobs.
pub const REASON_RUNNING: &str = "Running";

/// Reason reported for finished jobs.
pub const REASON_FINISHED: &str = "end of job";

/// Everything the deriver needs besides the record itself.
#[derive(Debug, Clone)]
pub struct Deriver {
    registry: TresRegistry,
    gpu_accounting: bool,
    now: i64,
}

impl Deriver {
    /// `gpu_accounting` follows the cluster's select plugin; `now` is Unix seconds.
    pub fn new(registry: TresRegistry, gpu_accounting: bool, now: i64) -> Self {
        Self {
            registry,
            gpu_accounting,
            now,
        }
    }

    /// Base state of a stored state word; flag bits are ignored.
    pub fn state_of(record: &JobRecord) -> AdapterResult<JobState> {
        JobState::from_stored(record.state).ok_or_else(|| {
            AdapterError::Internal(format!(
                "job {} has unsupported state code {}",
                record.job_id, record.state
            ))
        })
    }

    /// Derive a job view from a store record.
    ///
    /// `live` carries the controller's reason and elapsed time for
    /// non-terminal jobs; when absent the reason stays empty.
    pub fn derive(
        &self,
        record: &JobRecord,
        user: &str,
        live: Option<&LiveStatus>,
    ) -> AdapterResult<JobInfo> {
        let state = Self::state_of(record)?;
        let registry = &self.registry;

        let mut job = JobInfo {
            job_id: record.job_id,
            name: record.name.clone(),
            account: record.account.clone(),
            user: user.to_string(),
            partition: record.partition.clone(),
            qos: record.qos.clone(),
            state,
            cpus_req: registry.cpus(&record.tres_req),
            mem_req_mb: registry.mem_mb(&record.tres_req),
            nodes_req: registry.nodes(&record.tres_req),
            gpus_req: registry.gpus(&record.tres_req),
            submit_time: record.time_submit,
            start_time: record.time_start,
            end_time: record.time_end,
            suspended_time: record.time_suspended,
            time_limit_minutes: normalize_time_limit(record.time_limit),
            work_dir: record.work_dir.clone(),
            node_list: record.node_list.clone(),
            ..Default::default()
        };

        if state != JobState::Pending {
            job.cpus_alloc = registry.cpus(&record.tres_alloc);
            job.mem_alloc_mb = registry.mem_mb(&record.tres_alloc);
            job.nodes_alloc = registry.nodes(&record.tres_alloc);
            if self.gpu_accounting {
                job.gpus_alloc = registry.gpus(&record.tres_alloc);
            }
        }

        match state {
            JobState::Pending => {
                job.reason = live.map(|l| l.reason.clone()).unwrap_or_default();
            }
            JobState::Running => {
                job.reason = REASON_RUNNING.to_string();
                job.elapsed_seconds = if record.time_start > 0 {
                    (self.now - record.time_start).max(0)
                } else {
                    0
                };
            }
            JobState::Suspended => {
                job.reason = live.map(|l| l.reason.clone()).unwrap_or_default();
                job.elapsed_seconds = live.map_or(0, |l| l.elapsed_seconds);
            }
            _ => {
                job.reason = REASON_FINISHED.to_string();
                job.elapsed_seconds = if record.time_start > 0 && record.time_end > 0 {
                    (record.time_end - record.time_start).max(0)
                } else {
                    0
                };
            }
        }

        Ok(job)
    }
}

/// Job view of an `squeue` row. `submit_time` comes from the store.
pub fn from_live_row(row: &LiveJobRow, submit_time: i64, gpu_accounting: bool) -> JobInfo {
    let started = row.state != JobState::Pending;
    let alloc = |value: i64| if started { value } else { 0 };
    JobInfo {
        job_id: row.job_id,
        name: row.name.clone(),
        account: row.account.clone(),
        user: row.user.clone(),
        partition: row.partition.clone(),
        qos: row.qos.clone(),
        state: row.state,
        reason: match row.state {
            JobState::Running => REASON_RUNNING.to_string(),
            _ => row.reason.clone(),
        },
        cpus_req: row.cpu_count,
        nodes_req: row.node_count,
        gpus_req: row.gpu_count,
        cpus_alloc: alloc(row.cpu_count),
        nodes_alloc: alloc(row.node_count),
        gpus_alloc: if gpu_accounting {
            alloc(row.gpu_count)
        } else {
            0
        },
        submit_time,
        start_time: if started { row.start_time } else { 0 },
        elapsed_seconds: row.elapsed_seconds,
        time_limit_minutes: row
            .time_limit_minutes
            .unwrap_or(crate::job::UNLIMITED_TIME_LIMIT),
        work_dir: row.work_dir.clone(),
        node_list: row.node_list.clone(),
        ..Default::default()
    }
}
