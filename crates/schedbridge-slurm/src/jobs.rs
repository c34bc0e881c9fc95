//! Job submission, cancellation and time limits.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::adapter::{validate_identifier, SlurmAdapter};
use crate::control::{time_limit_delta, Submission};
use crate::error::{AdapterError, AdapterResult};
use crate::job::normalize_time_limit;
use crate::templates::{generate_batch_script, script_work_dir, JobSpec};

/// A submitted job and the batch script generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: i64,
    pub script: String,
}

impl SlurmAdapter {
    /// Generate a batch script from a job description and submit it as `user`.
    #[instrument(skip(self, spec), fields(account = %spec.account, partition = %spec.partition))]
    pub async fn submit_job(&self, user: &str, spec: &JobSpec) -> AdapterResult<SubmittedJob> {
        validate_identifier("user", user)?;
        validate_identifier("account", &spec.account)?;
        validate_identifier("partition", &spec.partition)?;
        if let Some(qos) = spec.qos.as_deref().filter(|q| !q.is_empty()) {
            validate_identifier("qos", qos)?;
        }
        let script = generate_batch_script(spec, &self.settings.default_qos)?;
        let job_id = self
            .control
            .submit(&Submission {
                user: user.to_string(),
                script: script.clone(),
                work_dir: spec.work_dir.clone(),
            })
            .await?;
        Ok(SubmittedJob { job_id, script })
    }

    /// Submit a caller-provided script as `user`.
    ///
    /// When the script's file path is known, its directory becomes the
    /// working directory.
    #[instrument(skip(self, script))]
    pub async fn submit_script_as_job(
        &self,
        user: &str,
        script: &str,
        script_path: Option<&str>,
    ) -> AdapterResult<i64> {
        validate_identifier("user", user)?;
        if script.trim().is_empty() {
            return Err(AdapterError::InvalidArgument("script is empty".to_string()));
        }
        self.control
            .submit(&Submission {
                user: user.to_string(),
                script: script.to_string(),
                work_dir: script_path.and_then(script_work_dir),
            })
            .await
    }

    /// Cancel a job on behalf of `user`.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: i64, user: &str) -> AdapterResult<()> {
        validate_identifier("user", user)?;
        self.require_job(job_id).await?;
        self.control.cancel(job_id, user).await
    }

    /// Time limit of a job in minutes, [`crate::job::UNLIMITED_TIME_LIMIT`] if unlimited.
    #[instrument(skip(self))]
    pub async fn query_job_time_limit(&self, job_id: i64) -> AdapterResult<i64> {
        let record = self.require_job(job_id).await?;
        Ok(normalize_time_limit(record.time_limit))
    }

    /// Extend or shorten a job's time limit by `delta_minutes`.
    #[instrument(skip(self))]
    pub async fn change_job_time_limit(&self, job_id: i64, delta_minutes: i64) -> AdapterResult<()> {
        time_limit_delta(delta_minutes)?;
        self.require_job(job_id).await?;
        self.control.change_time_limit(job_id, delta_minutes).await
    }

    async fn require_job(&self, job_id: i64) -> AdapterResult<crate::accounting::JobRecord> {
        self.store
            .latest_job(job_id)
            .await?
            .ok_or(AdapterError::JobNotFound(job_id))
    }
}
