//! In-memory implementations of every port, for tests.
//!
//! [`RecordingControl`] applies its commands to a shared [`MemoryStore`] and
//! [`FakeScheduler`], so a mutation is visible to later queries the way it
//! would be on a real cluster.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::accounting::{
    AccountingStore, Association, JobPage, JobQuery, JobRecord, SortField,
};
use crate::control::{SchedulerControlPort, Submission};
use crate::error::{AdapterError, AdapterResult};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::identity::IdentityResolver;
use crate::live::{
    AccessList, LiveJobFilter, LiveJobRow, LiveStatus, NodeInfo, PartitionInfo, PartitionTotals,
    SchedulerQueryPort,
};
use crate::state::{JobState, STATE_BASE_MASK};
use crate::tres::TresRow;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Executor answering commands from a script of canned outputs.
///
/// A rule matches when the rendered command line starts with its prefix;
/// the first matching rule wins. Unmatched commands exit with status 127.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `stdout` and exit 0.
    pub fn on(self, prefix: &str, stdout: &str) -> Self {
        self.on_output(
            prefix,
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: 0,
            },
        )
    }

    pub fn on_output(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.rules.push((prefix.to_string(), output));
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, spec: &CommandSpec) -> AdapterResult<CommandOutput> {
        locked(&self.calls).push(spec.clone());
        let line = spec.display();
        Ok(self
            .rules
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput {
                stdout: String::new(),
                stderr: format!("no scripted output for: {line}"),
                exit_code: 127,
            }))
    }
}

#[derive(Default)]
struct StoreState {
    jobs: Vec<JobRecord>,
    tres: Vec<TresRow>,
    accounts: Vec<String>,
    users: Vec<String>,
    associations: Vec<Association>,
    qos: Vec<String>,
}

/// Accounting store kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// An empty store with the standard cpu/mem/node/gpu TRES rows
    /// (ids 1, 2, 4 and 1001) and the `normal` QOS.
    pub fn new() -> Self {
        let store = Self::default();
        {
            let mut state = locked(&store.state);
            state.tres = vec![
                TresRow {
                    id: 1,
                    kind: "cpu".into(),
                    name: String::new(),
                },
                TresRow {
                    id: 2,
                    kind: "mem".into(),
                    name: String::new(),
                },
                TresRow {
                    id: 4,
                    kind: "node".into(),
                    name: String::new(),
                },
                TresRow {
                    id: 1001,
                    kind: "gres".into(),
                    name: "gpu".into(),
                },
            ];
            state.qos = vec!["normal".into()];
        }
        store
    }

    pub fn with_account(self, account: &str) -> Self {
        self.add_account(account);
        self
    }

    pub fn with_user(self, user: &str) -> Self {
        self.add_user(user);
        self
    }

    /// Add an association (creating the user and account rows as needed).
    pub fn with_association(self, user: &str, account: &str, max_submit_jobs: Option<i32>) -> Self {
        self.add_user(user);
        self.add_account(account);
        locked(&self.state).associations.push(Association {
            user: user.to_string(),
            account: account.to_string(),
            partition: String::new(),
            max_submit_jobs,
        });
        self
    }

    pub fn with_job(self, job: JobRecord) -> Self {
        self.insert_job(job);
        self
    }

    pub fn with_qos(self, qos: &str) -> Self {
        locked(&self.state).qos.push(qos.to_string());
        self
    }

    pub fn add_account(&self, account: &str) {
        let mut state = locked(&self.state);
        if !state.accounts.iter().any(|a| a == account) {
            state.accounts.push(account.to_string());
        }
    }

    pub fn add_user(&self, user: &str) {
        let mut state = locked(&self.state);
        if !state.users.iter().any(|u| u == user) {
            state.users.push(user.to_string());
        }
    }

    pub fn insert_job(&self, mut job: JobRecord) {
        let mut state = locked(&self.state);
        if job.job_db_inx == 0 {
            job.job_db_inx = state.jobs.len() as i64 + 1;
        }
        state.jobs.push(job);
    }

    fn set_max_submit_jobs(&self, user: &str, account: &str, value: i32) {
        let mut state = locked(&self.state);
        for association in state
            .associations
            .iter_mut()
            .filter(|a| a.user == user && a.account == account)
        {
            association.max_submit_jobs = if value < 0 { None } else { Some(value) };
        }
    }

    fn add_association(&self, user: &str, account: &str) {
        let exists = locked(&self.state)
            .associations
            .iter()
            .any(|a| a.user == user && a.account == account);
        if !exists {
            self.add_user(user);
            locked(&self.state).associations.push(Association {
                user: user.to_string(),
                account: account.to_string(),
                partition: String::new(),
                max_submit_jobs: None,
            });
        }
    }

    fn remove_association(&self, user: &str, account: &str) {
        locked(&self.state)
            .associations
            .retain(|a| !(a.user == user && a.account == account));
    }

    /// Every association row.
    pub fn associations(&self) -> Vec<Association> {
        locked(&self.state).associations.clone()
    }
}

fn record_matches(job: &JobRecord, query: &JobQuery) -> bool {
    let filter = &query.filter;
    let in_range = |value: i64, range: Option<crate::accounting::TimeRange>| {
        range.is_none_or(|r| {
            r.start.is_none_or(|s| value >= s) && r.end.is_none_or(|e| value <= e)
        })
    };
    (filter.accounts.is_empty() || filter.accounts.contains(&job.account))
        && (filter.user_ids.is_empty()
            || filter
                .user_ids
                .iter()
                .any(|uid| i64::from(*uid) == job.user_id))
        && (filter.states.is_empty() || filter
                .states
                .iter()
                .any(|s| s.code() == job.state & STATE_BASE_MASK))
        && filter.job_id.is_none_or(|id| id == job.job_id)
        && filter.job_name.as_ref().is_none_or(|name| name == &job.name)
        && in_range(job.time_submit, filter.submit_time)
        && in_range(job.time_end, filter.end_time)
}

fn compare_records(a: &JobRecord, b: &JobRecord, field: SortField) -> std::cmp::Ordering {
    match field {
        SortField::JobDbInx => a.job_db_inx.cmp(&b.job_db_inx),
        SortField::JobId => a.job_id.cmp(&b.job_id),
        SortField::JobName => a.name.cmp(&b.name),
        SortField::Account => a.account.cmp(&b.account),
        SortField::Partition => a.partition.cmp(&b.partition),
        SortField::State => (a.state & STATE_BASE_MASK).cmp(&(b.state & STATE_BASE_MASK)),
        SortField::SubmitTime => a.time_submit.cmp(&b.time_submit),
        SortField::StartTime => a.time_start.cmp(&b.time_start),
        SortField::EndTime => a.time_end.cmp(&b.time_end),
    }
}

#[async_trait]
impl AccountingStore for MemoryStore {
    async fn query_jobs(&self, query: &JobQuery) -> AdapterResult<JobPage> {
        let mut rows: Vec<JobRecord> = locked(&self.state)
            .jobs
            .iter()
            .filter(|job| record_matches(job, query))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let ordering = compare_records(a, b, query.sort.field);
            if query.sort.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        let total = rows.len() as u64;
        if let Some(page) = query.page {
            rows = rows
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .collect();
        }
        Ok(JobPage {
            rows,
            total_count: query.want_total.then_some(total),
        })
    }

    async fn latest_job(&self, job_id: i64) -> AdapterResult<Option<JobRecord>> {
        Ok(locked(&self.state)
            .jobs
            .iter()
            .filter(|job| job.job_id == job_id)
            .max_by_key(|job| job.job_db_inx)
            .cloned())
    }

    async fn submit_times(&self, job_ids: &[i64]) -> AdapterResult<FxHashMap<i64, i64>> {
        let state = locked(&self.state);
        let mut jobs: Vec<&JobRecord> = state
            .jobs
            .iter()
            .filter(|job| job_ids.contains(&job.job_id))
            .collect();
        jobs.sort_by_key(|job| job.job_db_inx);
        Ok(jobs
            .into_iter()
            .map(|job| (job.job_id, job.time_submit))
            .collect())
    }

    async fn tres_rows(&self) -> AdapterResult<Vec<TresRow>> {
        Ok(locked(&self.state).tres.clone())
    }

    async fn account_exists(&self, account: &str) -> AdapterResult<bool> {
        Ok(locked(&self.state).accounts.iter().any(|a| a == account))
    }

    async fn user_exists(&self, user: &str) -> AdapterResult<bool> {
        Ok(locked(&self.state).users.iter().any(|u| u == user))
    }

    async fn association(&self, user: &str, account: &str) -> AdapterResult<Option<Association>> {
        Ok(locked(&self.state)
            .associations
            .iter()
            .find(|a| a.user == user && a.account == account)
            .cloned())
    }

    async fn user_associations(&self, user: &str) -> AdapterResult<Vec<Association>> {
        Ok(locked(&self.state)
            .associations
            .iter()
            .filter(|a| a.user == user)
            .cloned()
            .collect())
    }

    async fn account_associations(&self, account: &str) -> AdapterResult<Vec<Association>> {
        Ok(locked(&self.state)
            .associations
            .iter()
            .filter(|a| a.account == account && !a.user.is_empty())
            .cloned()
            .collect())
    }

    async fn list_accounts(&self) -> AdapterResult<Vec<String>> {
        let mut accounts = locked(&self.state).accounts.clone();
        accounts.sort();
        Ok(accounts)
    }

    async fn cluster_accounts(&self) -> AdapterResult<Vec<String>> {
        let mut accounts: Vec<String> = Vec::new();
        for association in &locked(&self.state).associations {
            if !accounts.contains(&association.account) {
                accounts.push(association.account.clone());
            }
        }
        Ok(accounts)
    }

    async fn qos_names(&self) -> AdapterResult<Vec<String>> {
        Ok(locked(&self.state).qos.clone())
    }
}

#[derive(Default)]
struct SchedulerState {
    partitions: Vec<PartitionInfo>,
    nodes: Vec<NodeInfo>,
    jobs: Vec<LiveJobRow>,
    reasons: FxHashMap<i64, LiveStatus>,
    select_type: String,
    /// Applied to a partition's ACL right after its next read.
    interference: Vec<(String, AccessList)>,
    unreachable: bool,
}

/// Controller state kept in memory.
pub struct FakeScheduler {
    state: Mutex<SchedulerState>,
}

impl Default for FakeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeScheduler {
    /// A controller with no partitions and the `select/cons_tres` plugin.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                select_type: "select/cons_tres".to_string(),
                ..Default::default()
            }),
        }
    }

    /// Add a partition with the given ACL and small default totals.
    pub fn with_partition(self, name: &str, allow_accounts: AccessList) -> Self {
        locked(&self.state).partitions.push(PartitionInfo {
            name: name.to_string(),
            allow_accounts,
            totals: PartitionTotals {
                cores: 64,
                mem_mb: 256_000,
                nodes: 2,
                gpus: 0,
                qos: AccessList::All,
            },
            state: "UP".to_string(),
        });
        self
    }

    pub fn with_partition_info(self, partition: PartitionInfo) -> Self {
        locked(&self.state).partitions.push(partition);
        self
    }

    pub fn with_node(self, node: NodeInfo) -> Self {
        locked(&self.state).nodes.push(node);
        self
    }

    pub fn with_live_job(self, row: LiveJobRow) -> Self {
        locked(&self.state).jobs.push(row);
        self
    }

    pub fn with_reason(self, job_id: i64, state: JobState, reason: &str) -> Self {
        self.set_reason(job_id, state, reason, 0);
        self
    }

    /// Report a job in a controller state with no job state label, like `COMPLETING`.
    pub fn with_transitional_job(self, job_id: i64, reason: &str) -> Self {
        locked(&self.state).reasons.insert(
            job_id,
            LiveStatus {
                state: None,
                reason: reason.to_string(),
                elapsed_seconds: 0,
            },
        );
        self
    }

    pub fn with_select_type(self, select_type: &str) -> Self {
        locked(&self.state).select_type = select_type.to_string();
        self
    }

    pub fn set_reason(&self, job_id: i64, state: JobState, reason: &str, elapsed_seconds: i64) {
        locked(&self.state).reasons.insert(
            job_id,
            LiveStatus {
                state: Some(state),
                reason: reason.to_string(),
                elapsed_seconds,
            },
        );
    }

    /// Current `AllowAccounts` of a partition.
    pub fn allow_accounts(&self, partition: &str) -> Option<AccessList> {
        locked(&self.state)
            .partitions
            .iter()
            .find(|p| p.name == partition)
            .map(|p| p.allow_accounts.clone())
    }

    pub fn set_allow_accounts(&self, partition: &str, acl: AccessList) {
        let mut state = locked(&self.state);
        if let Some(p) = state.partitions.iter_mut().find(|p| p.name == partition) {
            p.allow_accounts = acl;
        }
    }

    /// Change a partition's ACL right after its next read, as a concurrent
    /// writer outside this process would.
    pub fn interfere_after_next_read(&self, partition: &str, acl: AccessList) {
        locked(&self.state)
            .interference
            .push((partition.to_string(), acl));
    }

    /// Make every query fail as if slurmctld were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        locked(&self.state).unreachable = unreachable;
    }

    fn check_reachable(&self, command: &str) -> AdapterResult<()> {
        if locked(&self.state).unreachable {
            Err(AdapterError::ControllerUnreachable(command.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SchedulerQueryPort for FakeScheduler {
    async fn query_nodes(&self, names: &[String]) -> AdapterResult<Vec<NodeInfo>> {
        self.check_reachable("scontrol show node")?;
        let state = locked(&self.state);
        if names.is_empty() {
            return Ok(state.nodes.clone());
        }
        names
            .iter()
            .map(|name| {
                state
                    .nodes
                    .iter()
                    .find(|n| &n.name == name)
                    .cloned()
                    .ok_or_else(|| AdapterError::NodeNotFound(name.clone()))
            })
            .collect()
    }

    async fn query_jobs(&self, filter: &LiveJobFilter) -> AdapterResult<Vec<LiveJobRow>> {
        self.check_reachable("squeue")?;
        let state = locked(&self.state);
        Ok(state
            .jobs
            .iter()
            .filter(|row| filter.users.is_empty() || filter.users.contains(&row.user))
            .filter(|row| filter.accounts.is_empty() || filter.accounts.contains(&row.account))
            .filter(|row| {
                filter.partitions.is_empty() || filter.partitions.contains(&row.partition)
            })
            .filter(|row| filter.job_ids.is_empty() || filter.job_ids.contains(&row.job_id))
            .filter(|row| {
                if filter.states.is_empty() {
                    row.state.is_live()
                } else {
                    filter.states.contains(&row.state)
                }
            })
            .cloned()
            .collect())
    }

    async fn query_partitions(&self) -> AdapterResult<Vec<PartitionInfo>> {
        self.check_reachable("scontrol show partition")?;
        Ok(locked(&self.state).partitions.clone())
    }

    async fn query_partition_allow_accounts(&self, partition: &str) -> AdapterResult<AccessList> {
        self.check_reachable("scontrol show partition")?;
        let mut state = locked(&self.state);
        let acl = state
            .partitions
            .iter()
            .find(|p| p.name == partition)
            .map(|p| p.allow_accounts.clone())
            .ok_or_else(|| AdapterError::Parse {
                command: "scontrol show partition".to_string(),
                message: format!("partition {partition} missing from output"),
            })?;
        if let Some(idx) = state.interference.iter().position(|(p, _)| p == partition) {
            let (_, replacement) = state.interference.remove(idx);
            if let Some(p) = state.partitions.iter_mut().find(|p| p.name == partition) {
                p.allow_accounts = replacement;
            }
        }
        Ok(acl)
    }

    async fn query_partition_totals(&self, partition: &str) -> AdapterResult<PartitionTotals> {
        self.check_reachable("scontrol show partition")?;
        locked(&self.state)
            .partitions
            .iter()
            .find(|p| p.name == partition)
            .map(|p| p.totals.clone())
            .ok_or_else(|| AdapterError::Parse {
                command: "scontrol show partition".to_string(),
                message: format!("partition {partition} missing from output"),
            })
    }

    async fn query_pending_reasons(
        &self,
        job_ids: &[i64],
    ) -> AdapterResult<FxHashMap<i64, LiveStatus>> {
        self.check_reachable("squeue")?;
        let state = locked(&self.state);
        Ok(job_ids
            .iter()
            .filter_map(|id| state.reasons.get(id).map(|s| (*id, s.clone())))
            .collect())
    }

    async fn select_type(&self) -> AdapterResult<String> {
        self.check_reachable("scontrol show config")?;
        Ok(locked(&self.state).select_type.clone())
    }
}

/// A command issued through [`RecordingControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCall {
    SetAllowAccounts { partition: String, acl: AccessList },
    SetMaxSubmitJobs { user: String, account: String, value: i32 },
    CreateAccount(String),
    CreateAssociation { user: String, account: String },
    DeleteAssociation { user: String, account: String },
    Submit(Submission),
    Cancel { job_id: i64, user: String },
    ChangeTimeLimit { job_id: i64, delta_minutes: i64 },
}

/// Control port that records calls and applies them to the fakes.
///
/// Submitted jobs get ids from 1000 upwards and appear in the store as
/// PENDING, with the controller reporting reason `Priority`.
pub struct RecordingControl {
    store: Arc<MemoryStore>,
    scheduler: Arc<FakeScheduler>,
    calls: Mutex<Vec<ControlCall>>,
    next_job_id: Mutex<i64>,
    failing_partitions: Mutex<Vec<String>>,
    rejection: Mutex<Option<String>>,
    uids: Mutex<FxHashMap<String, i64>>,
}

impl RecordingControl {
    pub fn new(store: Arc<MemoryStore>, scheduler: Arc<FakeScheduler>) -> Self {
        Self {
            store,
            scheduler,
            calls: Mutex::new(Vec::new()),
            next_job_id: Mutex::new(1000),
            failing_partitions: Mutex::new(Vec::new()),
            rejection: Mutex::new(None),
            uids: Mutex::new(FxHashMap::default()),
        }
    }

    /// Uid stored on jobs submitted by `user`.
    pub fn map_user(&self, user: &str, uid: u32) {
        locked(&self.uids).insert(user.to_string(), i64::from(uid));
    }

    pub fn calls(&self) -> Vec<ControlCall> {
        locked(&self.calls).clone()
    }

    /// ACL writes recorded so far, as `(partition, acl)`.
    pub fn acl_writes(&self) -> Vec<(String, AccessList)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ControlCall::SetAllowAccounts { partition, acl } => Some((partition, acl)),
                _ => None,
            })
            .collect()
    }

    /// Make ACL writes to `partition` fail.
    pub fn fail_partition(&self, partition: &str) {
        locked(&self.failing_partitions).push(partition.to_string());
    }

    /// Make job commands fail with `stderr`, as a scheduler rejection.
    pub fn reject_jobs(&self, stderr: &str) {
        *locked(&self.rejection) = Some(stderr.to_string());
    }

    fn record(&self, call: ControlCall) {
        locked(&self.calls).push(call);
    }

    fn check_rejection(&self) -> AdapterResult<()> {
        match locked(&self.rejection).clone() {
            Some(message) => Err(AdapterError::Scheduler(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SchedulerControlPort for RecordingControl {
    async fn set_partition_allow_accounts(
        &self,
        partition: &str,
        accounts: &AccessList,
    ) -> AdapterResult<()> {
        if locked(&self.failing_partitions).iter().any(|p| p == partition) {
            return Err(AdapterError::CommandFailed {
                command: format!("scontrol update PartitionName={partition}"),
                message: "Invalid partition name specified".to_string(),
            });
        }
        self.record(ControlCall::SetAllowAccounts {
            partition: partition.to_string(),
            acl: accounts.clone(),
        });
        self.scheduler.set_allow_accounts(partition, accounts.clone());
        Ok(())
    }

    async fn set_max_submit_jobs(
        &self,
        user: &str,
        account: &str,
        value: i32,
    ) -> AdapterResult<()> {
        self.record(ControlCall::SetMaxSubmitJobs {
            user: user.to_string(),
            account: account.to_string(),
            value,
        });
        self.store.set_max_submit_jobs(user, account, value);
        Ok(())
    }

    async fn create_account(&self, account: &str) -> AdapterResult<()> {
        self.record(ControlCall::CreateAccount(account.to_string()));
        self.store.add_account(account);
        Ok(())
    }

    async fn create_association(&self, user: &str, account: &str) -> AdapterResult<()> {
        self.record(ControlCall::CreateAssociation {
            user: user.to_string(),
            account: account.to_string(),
        });
        self.store.add_association(user, account);
        Ok(())
    }

    async fn delete_association(&self, user: &str, account: &str) -> AdapterResult<()> {
        self.record(ControlCall::DeleteAssociation {
            user: user.to_string(),
            account: account.to_string(),
        });
        self.store.remove_association(user, account);
        Ok(())
    }

    async fn submit(&self, submission: &Submission) -> AdapterResult<i64> {
        self.check_rejection()?;
        self.record(ControlCall::Submit(submission.clone()));
        let job_id = {
            let mut next = locked(&self.next_job_id);
            let id = *next;
            *next += 1;
            id
        };
        let directive = |name: &str| {
            submission
                .script
                .lines()
                .find_map(|line| line.strip_prefix(&format!("#SBATCH --{name}=")))
                .map(str::to_string)
                .unwrap_or_default()
        };
        let user_id = locked(&self.uids)
            .get(&submission.user)
            .copied()
            .unwrap_or_default();
        self.store.insert_job(JobRecord {
            job_id,
            user_id,
            name: directive("job-name"),
            account: directive("account"),
            partition: directive("partition"),
            qos: directive("qos"),
            state: JobState::Pending.code(),
            time_submit: 1_700_000_000,
            time_limit: 0xffff_fffe,
            tres_req: format!(
                "1={},4={}",
                directive("cpus-per-task").parse::<i64>().unwrap_or(1),
                directive("nodes").parse::<i64>().unwrap_or(1)
            ),
            work_dir: submission.work_dir.clone().unwrap_or_default(),
            ..Default::default()
        });
        self.scheduler
            .set_reason(job_id, JobState::Pending, "Priority", 0);
        Ok(job_id)
    }

    async fn cancel(&self, job_id: i64, user: &str) -> AdapterResult<()> {
        self.check_rejection()?;
        self.record(ControlCall::Cancel {
            job_id,
            user: user.to_string(),
        });
        Ok(())
    }

    async fn change_time_limit(&self, job_id: i64, delta_minutes: i64) -> AdapterResult<()> {
        self.check_rejection()?;
        self.record(ControlCall::ChangeTimeLimit {
            job_id,
            delta_minutes,
        });
        Ok(())
    }
}

/// Identity resolver over a fixed name ↔ uid table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    users: Vec<(String, u32)>,
}

impl StaticIdentity {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(|(n, uid)| (n.into(), uid)).collect(),
        }
    }
}

impl IdentityResolver for StaticIdentity {
    fn uid_of(&self, user: &str) -> Option<u32> {
        self.users.iter().find(|(n, _)| n == user).map(|(_, uid)| *uid)
    }

    fn name_of(&self, uid: u32) -> Option<String> {
        self.users
            .iter()
            .find(|(_, u)| *u == uid)
            .map(|(n, _)| n.clone())
    }
}

/// Fakes wired into a [`SlurmAdapter`](crate::SlurmAdapter) for cluster `linux`.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scheduler: Arc<FakeScheduler>,
    pub control: Arc<RecordingControl>,
    pub adapter: crate::SlurmAdapter,
}

impl Harness {
    pub fn new(store: MemoryStore, scheduler: FakeScheduler, identity: StaticIdentity) -> Self {
        let store = Arc::new(store);
        let scheduler = Arc::new(scheduler);
        let control = Arc::new(RecordingControl::new(store.clone(), scheduler.clone()));
        for (user, uid) in &identity.users {
            control.map_user(user, *uid);
        }
        let adapter = crate::SlurmAdapter::new(
            crate::ClusterSettings::new("linux"),
            store.clone(),
            scheduler.clone(),
            control.clone(),
            Arc::new(identity),
        )
        .expect("valid cluster settings")
        .with_clock(|| 1_700_000_600);
        Self {
            store,
            scheduler,
            control,
            adapter,
        }
    }
}
