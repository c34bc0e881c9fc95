//! Mutating scheduler commands.
//!
//! [`SchedulerControlPort`] covers everything that changes controller or
//! accounting state: partition ACL writes, association limits, account and
//! user creation, job submission, cancellation and time-limit changes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AdapterError, AdapterResult};
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::live::parser;
use crate::live::AccessList;

/// `MaxSubmitJobs` value that blocks submission.
pub const MAX_SUBMIT_BLOCKED: i32 = 0;

/// `MaxSubmitJobs` value that removes the limit.
pub const MAX_SUBMIT_UNLIMITED: i32 = -1;

/// A batch script ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Submitting user; `sbatch` runs as this user.
    pub user: String,
    pub script: String,
    /// Directory `sbatch` is started from.
    pub work_dir: Option<String>,
}

/// Commands that change scheduler or accounting state.
#[async_trait]
pub trait SchedulerControlPort: Send + Sync {
    /// Replace a partition's `AllowAccounts`.
    async fn set_partition_allow_accounts(
        &self,
        partition: &str,
        accounts: &AccessList,
    ) -> AdapterResult<()>;

    /// Set `MaxSubmitJobs` on the user's association with an account.
    async fn set_max_submit_jobs(&self, user: &str, account: &str, value: i32)
    -> AdapterResult<()>;

    async fn create_account(&self, account: &str) -> AdapterResult<()>;

    /// Create the user's association with an account (and the user if needed).
    async fn create_association(&self, user: &str, account: &str) -> AdapterResult<()>;

    async fn delete_association(&self, user: &str, account: &str) -> AdapterResult<()>;

    /// Submit a batch script and return the new job id.
    async fn submit(&self, submission: &Submission) -> AdapterResult<i64>;

    /// Cancel a job on behalf of a user.
    async fn cancel(&self, job_id: i64, user: &str) -> AdapterResult<()>;

    /// Extend (positive) or shorten (negative) a job's time limit in minutes.
    async fn change_time_limit(&self, job_id: i64, delta_minutes: i64) -> AdapterResult<()>;
}

/// [`SchedulerControlPort`] driving `scontrol`, `sacctmgr`, `sbatch` and `scancel`.
pub struct CliSchedulerControl {
    executor: Arc<dyn CommandExecutor>,
}

impl CliSchedulerControl {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Administrative command: failures are internal errors.
    async fn admin(&self, spec: CommandSpec) -> AdapterResult<CommandOutput> {
        let output = self.executor.run(&spec).await?;
        parser::check_output(&spec, &output)?;
        Ok(output)
    }

    /// Job command: a rejection by the scheduler carries its stderr.
    async fn job_command(&self, spec: CommandSpec) -> AdapterResult<CommandOutput> {
        let output = self.executor.run(&spec).await?;
        if output.stdout.contains(parser::CONTROLLER_UNREACHABLE)
            || output.stderr.contains(parser::CONTROLLER_UNREACHABLE)
        {
            return Err(AdapterError::ControllerUnreachable(spec.display()));
        }
        if !output.success() {
            let message = output.stderr.trim();
            return Err(AdapterError::Scheduler(if message.is_empty() {
                format!("{} exited with status {}", spec.program, output.exit_code)
            } else {
                message.to_string()
            }));
        }
        Ok(output)
    }
}

/// `scontrol update` argument for a time-limit delta.
pub(crate) fn time_limit_delta(delta_minutes: i64) -> AdapterResult<String> {
    match delta_minutes {
        0 => Err(AdapterError::InvalidArgument(
            "time limit delta must not be zero".to_string(),
        )),
        d if d > 0 => Ok(format!("TimeLimit=+{d}")),
        d => Ok(format!("TimeLimit=-{}", d.unsigned_abs())),
    }
}

#[async_trait]
impl SchedulerControlPort for CliSchedulerControl {
    async fn set_partition_allow_accounts(
        &self,
        partition: &str,
        accounts: &AccessList,
    ) -> AdapterResult<()> {
        let spec = CommandSpec::new("scontrol").args([
            "update".to_string(),
            format!("PartitionName={partition}"),
            format!("AllowAccounts={}", accounts.render()),
        ]);
        tracing::info!(partition, accounts = %accounts.render(), "Updating partition ACL");
        self.admin(spec).await.map(|_| ())
    }

    async fn set_max_submit_jobs(
        &self,
        user: &str,
        account: &str,
        value: i32,
    ) -> AdapterResult<()> {
        let spec = CommandSpec::new("sacctmgr").args([
            "-i".to_string(),
            "modify".to_string(),
            "user".to_string(),
            format!("name={user}"),
            "where".to_string(),
            format!("account={account}"),
            "set".to_string(),
            format!("MaxSubmitJobs={value}"),
        ]);
        tracing::info!(user, account, value, "Setting MaxSubmitJobs");
        self.admin(spec).await.map(|_| ())
    }

    async fn create_account(&self, account: &str) -> AdapterResult<()> {
        let spec = CommandSpec::new("sacctmgr").args([
            "-i".to_string(),
            "create".to_string(),
            "account".to_string(),
            format!("name={account}"),
        ]);
        tracing::info!(account, "Creating account");
        self.admin(spec).await.map(|_| ())
    }

    async fn create_association(&self, user: &str, account: &str) -> AdapterResult<()> {
        let spec = CommandSpec::new("sacctmgr").args([
            "-i".to_string(),
            "create".to_string(),
            "user".to_string(),
            format!("name={user}"),
            format!("account={account}"),
        ]);
        tracing::info!(user, account, "Creating association");
        self.admin(spec).await.map(|_| ())
    }

    async fn delete_association(&self, user: &str, account: &str) -> AdapterResult<()> {
        let spec = CommandSpec::new("sacctmgr").args([
            "-i".to_string(),
            "delete".to_string(),
            "user".to_string(),
            format!("name={user}"),
            format!("account={account}"),
        ]);
        tracing::info!(user, account, "Deleting association");
        self.admin(spec).await.map(|_| ())
    }

    async fn submit(&self, submission: &Submission) -> AdapterResult<i64> {
        let mut spec = CommandSpec::new("sbatch")
            .stdin(submission.script.clone())
            .run_as(submission.user.clone());
        if let Some(dir) = &submission.work_dir {
            spec = spec.cwd(dir.clone());
        }
        let output = self.job_command(spec).await?;
        let job_id = parser::parse_sbatch_output(&output.stdout)?;
        tracing::info!(job_id, user = %submission.user, "Submitted batch job");
        Ok(job_id)
    }

    async fn cancel(&self, job_id: i64, user: &str) -> AdapterResult<()> {
        let spec = CommandSpec::new("scancel")
            .arg(job_id.to_string())
            .run_as(user);
        self.job_command(spec).await?;
        tracing::info!(job_id, user, "Cancelled job");
        Ok(())
    }

    async fn change_time_limit(&self, job_id: i64, delta_minutes: i64) -> AdapterResult<()> {
        let spec = CommandSpec::new("scontrol").args([
            "update".to_string(),
            format!("job={job_id}"),
            time_limit_delta(delta_minutes)?,
        ]);
        self.job_command(spec).await?;
        tracing::info!(job_id, delta_minutes, "Changed job time limit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;

    #[test]
    fn test_time_limit_delta() {
        assert_eq!(time_limit_delta(30).unwrap(), "TimeLimit=+30");
        assert_eq!(time_limit_delta(-15).unwrap(), "TimeLimit=-15");
        assert!(matches!(
            time_limit_delta(0),
            Err(AdapterError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_acl_write_command_line() {
        let executor = Arc::new(ScriptedExecutor::new().on("scontrol update", ""));
        let control = CliSchedulerControl::new(executor.clone());
        control
            .set_partition_allow_accounts(
                "compute",
                &AccessList::List(vec!["beta".into(), "gamma".into()]),
            )
            .await
            .unwrap();
        let calls = executor.calls();
        assert_eq!(
            calls[0].display(),
            "scontrol update PartitionName=compute AllowAccounts=beta,gamma"
        );
    }

    #[tokio::test]
    async fn test_block_user_command_line() {
        let executor = Arc::new(ScriptedExecutor::new().on("sacctmgr", ""));
        let control = CliSchedulerControl::new(executor.clone());
        control
            .set_max_submit_jobs("alice", "acme", MAX_SUBMIT_BLOCKED)
            .await
            .unwrap();
        control
            .set_max_submit_jobs("alice", "acme", MAX_SUBMIT_UNLIMITED)
            .await
            .unwrap();
        let calls = executor.calls();
        assert_eq!(
            calls[0].display(),
            "sacctmgr -i modify user name=alice where account=acme set MaxSubmitJobs=0"
        );
        assert!(calls[1].display().ends_with("MaxSubmitJobs=-1"));
    }

    #[tokio::test]
    async fn test_submit_runs_as_user_with_script_on_stdin() {
        let executor =
            Arc::new(ScriptedExecutor::new().on("sbatch", "Submitted batch job 4242\n"));
        let control = CliSchedulerControl::new(executor.clone());
        let job_id = control
            .submit(&Submission {
                user: "alice".into(),
                script: "#!/bin/bash\nhostname\n".into(),
                work_dir: Some("/home/alice".into()),
            })
            .await
            .unwrap();
        assert_eq!(job_id, 4242);
        let call = &executor.calls()[0];
        assert_eq!(call.run_as.as_deref(), Some("alice"));
        assert_eq!(call.cwd.as_deref(), Some("/home/alice"));
        assert_eq!(call.stdin.as_deref(), Some("#!/bin/bash\nhostname\n"));
    }

    #[tokio::test]
    async fn test_job_command_failure_is_unknown_with_stderr() {
        let executor = Arc::new(ScriptedExecutor::new().on_output(
            "scancel",
            CommandOutput {
                stdout: String::new(),
                stderr: "scancel: error: Kill job error on job id 7: Access/permission denied\n"
                    .into(),
                exit_code: 1,
            },
        ));
        let control = CliSchedulerControl::new(executor);
        let err = control.cancel(7, "mallory").await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Unknown);
        assert_eq!(
            err.to_string(),
            "scancel: error: Kill job error on job id 7: Access/permission denied"
        );
    }
}
