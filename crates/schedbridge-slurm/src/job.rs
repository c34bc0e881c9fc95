//! Job view returned to clients.

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};
use crate::state::JobState;

/// Time limit reported for jobs without one.
pub const UNLIMITED_TIME_LIMIT: i64 = -1;

/// Smallest stored time limit that is a sentinel (`NO_VAL`/`INFINITE`) rather
/// than a number of minutes.
const TIME_LIMIT_SENTINEL: i64 = 0xffff_fffd;

/// Map a stored time limit to minutes, [`UNLIMITED_TIME_LIMIT`] for sentinels.
pub fn normalize_time_limit(raw: i64) -> i64 {
    if raw < 0 || raw >= TIME_LIMIT_SENTINEL {
        UNLIMITED_TIME_LIMIT
    } else {
        raw
    }
}

/// A job, merged from the accounting store and the controller.
///
/// Times are Unix seconds; 0 means the job has not reached that point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: i64,
    pub name: String,
    pub account: String,
    pub user: String,
    pub partition: String,
    pub qos: String,
    pub state: JobState,
    pub reason: String,

    pub cpus_req: i64,
    pub mem_req_mb: i64,
    pub nodes_req: i64,
    pub gpus_req: i64,

    pub cpus_alloc: i64,
    pub mem_alloc_mb: i64,
    pub nodes_alloc: i64,
    pub gpus_alloc: i64,

    pub submit_time: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub suspended_time: i64,
    pub elapsed_seconds: i64,
    pub time_limit_minutes: i64,

    pub work_dir: String,
    pub node_list: String,
}

impl Default for JobInfo {
    fn default() -> Self {
        Self {
            job_id: 0,
            name: String::new(),
            account: String::new(),
            user: String::new(),
            partition: String::new(),
            qos: String::new(),
            state: JobState::Pending,
            reason: String::new(),
            cpus_req: 0,
            mem_req_mb: 0,
            nodes_req: 0,
            gpus_req: 0,
            cpus_alloc: 0,
            mem_alloc_mb: 0,
            nodes_alloc: 0,
            gpus_alloc: 0,
            submit_time: 0,
            start_time: 0,
            end_time: 0,
            suspended_time: 0,
            elapsed_seconds: 0,
            time_limit_minutes: 0,
            work_dir: String::new(),
            node_list: String::new(),
        }
    }
}

/// A field of [`JobInfo`] that a client can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobField {
    JobId,
    Name,
    Account,
    User,
    Partition,
    Qos,
    State,
    Reason,
    CpusReq,
    MemReqMb,
    NodesReq,
    GpusReq,
    CpusAlloc,
    MemAllocMb,
    NodesAlloc,
    GpusAlloc,
    SubmitTime,
    StartTime,
    EndTime,
    SuspendedTime,
    ElapsedSeconds,
    TimeLimitMinutes,
    WorkDir,
    NodeList,
}

impl JobField {
    pub const ALL: [JobField; 24] = [
        JobField::JobId,
        JobField::Name,
        JobField::Account,
        JobField::User,
        JobField::Partition,
        JobField::Qos,
        JobField::State,
        JobField::Reason,
        JobField::CpusReq,
        JobField::MemReqMb,
        JobField::NodesReq,
        JobField::GpusReq,
        JobField::CpusAlloc,
        JobField::MemAllocMb,
        JobField::NodesAlloc,
        JobField::GpusAlloc,
        JobField::SubmitTime,
        JobField::StartTime,
        JobField::EndTime,
        JobField::SuspendedTime,
        JobField::ElapsedSeconds,
        JobField::TimeLimitMinutes,
        JobField::WorkDir,
        JobField::NodeList,
    ];

    /// Wire name, identical to the serialized [`JobInfo`] key.
    pub fn name(&self) -> &'static str {
        match self {
            JobField::JobId => "job_id",
            JobField::Name => "name",
            JobField::Account => "account",
            JobField::User => "user",
            JobField::Partition => "partition",
            JobField::Qos => "qos",
            JobField::State => "state",
            JobField::Reason => "reason",
            JobField::CpusReq => "cpus_req",
            JobField::MemReqMb => "mem_req_mb",
            JobField::NodesReq => "nodes_req",
            JobField::GpusReq => "gpus_req",
            JobField::CpusAlloc => "cpus_alloc",
            JobField::MemAllocMb => "mem_alloc_mb",
            JobField::NodesAlloc => "nodes_alloc",
            JobField::GpusAlloc => "gpus_alloc",
            JobField::SubmitTime => "submit_time",
            JobField::StartTime => "start_time",
            JobField::EndTime => "end_time",
            JobField::SuspendedTime => "suspended_time",
            JobField::ElapsedSeconds => "elapsed_seconds",
            JobField::TimeLimitMinutes => "time_limit_minutes",
            JobField::WorkDir => "work_dir",
            JobField::NodeList => "node_list",
        }
    }

    pub fn parse(name: &str) -> AdapterResult<Self> {
        let name = name.trim();
        JobField::ALL
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| AdapterError::InvalidArgument(format!("unknown job field: {name}")))
    }

    /// Parse a field list. Empty means every field.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> AdapterResult<Vec<JobField>> {
        names.iter().map(|n| JobField::parse(n.as_ref())).collect()
    }
}

impl JobInfo {
    /// Keep only the named fields; every other field is reset to its default.
    /// An empty list keeps everything.
    pub fn project(self, fields: &[JobField]) -> JobInfo {
        if fields.is_empty() {
            return self;
        }
        let mut out = JobInfo::default();
        for field in fields {
            match field {
                JobField::JobId => out.job_id = self.job_id,
                JobField::Name => out.name.clone_from(&self.name),
                JobField::Account => out.account.clone_from(&self.account),
                JobField::User => out.user.clone_from(&self.user),
                JobField::Partition => out.partition.clone_from(&self.partition),
                JobField::Qos => out.qos.clone_from(&self.qos),
                JobField::State => out.state = self.state,
                JobField::Reason => out.reason.clone_from(&self.reason),
                JobField::CpusReq => out.cpus_req = self.cpus_req,
                JobField::MemReqMb => out.mem_req_mb = self.mem_req_mb,
                JobField::NodesReq => out.nodes_req = self.nodes_req,
                JobField::GpusReq => out.gpus_req = self.gpus_req,
                JobField::CpusAlloc => out.cpus_alloc = self.cpus_alloc,
                JobField::MemAllocMb => out.mem_alloc_mb = self.mem_alloc_mb,
                JobField::NodesAlloc => out.nodes_alloc = self.nodes_alloc,
                JobField::GpusAlloc => out.gpus_alloc = self.gpus_alloc,
                JobField::SubmitTime => out.submit_time = self.submit_time,
                JobField::StartTime => out.start_time = self.start_time,
                JobField::EndTime => out.end_time = self.end_time,
                JobField::SuspendedTime => out.suspended_time = self.suspended_time,
                JobField::ElapsedSeconds => out.elapsed_seconds = self.elapsed_seconds,
                JobField::TimeLimitMinutes => out.time_limit_minutes = self.time_limit_minutes,
                JobField::WorkDir => out.work_dir.clone_from(&self.work_dir),
                JobField::NodeList => out.node_list.clone_from(&self.node_list),
            }
        }
        out
    }
}
