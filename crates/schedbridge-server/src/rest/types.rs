//! JSON request/response types for the gateway.

use serde::{Deserialize, Serialize};

use schedbridge_slurm::{
    AccountWithUsers, AdapterError, AdapterResult, JobField, JobListRequest, JobSort, JobSpec,
    JobState, NodeSummary, Page, PartitionConfig, PartitionUsage, SortField, TimeRange,
};

// ── Requests ──────────────────────────────────────────────────────────────

/// ListAccounts
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub user: String,
}

/// BlockAccount, UnblockAccount, QueryAccountBlockStatus
#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub account: String,
}

/// CreateAccount
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub account: String,
    /// First user of the account.
    pub owner: String,
}

/// AddUserToAccount, RemoveUserFromAccount, BlockUserInAccount,
/// UnblockUserInAccount, QueryUserInAccountBlockStatus, GetAvailablePartitions
#[derive(Debug, Deserialize)]
pub struct UserAccountRequest {
    pub user: String,
    pub account: String,
}

/// GetJobById
#[derive(Debug, Deserialize)]
pub struct GetJobByIdRequest {
    pub job_id: i64,
    /// Field names to populate; empty means all.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// GetJobs
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GetJobsRequest {
    pub accounts: Vec<String>,
    pub users: Vec<String>,
    /// State labels; `CANCELED` is accepted for `CANCELLED`.
    pub states: Vec<String>,
    pub job_id: Option<i64>,
    pub job_name: Option<String>,
    pub submit_time: Option<TimeRange>,
    pub end_time: Option<TimeRange>,
    pub sort_by: Option<String>,
    pub descending: bool,
    /// 1-based page number; requires `page_size`.
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
    pub fields: Vec<String>,
}

impl GetJobsRequest {
    /// Validate names and build the core request.
    pub fn into_request(self) -> AdapterResult<JobListRequest> {
        let states = self
            .states
            .iter()
            .map(|label| {
                JobState::from_label(label).ok_or_else(|| {
                    AdapterError::InvalidArgument(format!("unknown job state: {label}"))
                })
            })
            .collect::<AdapterResult<Vec<_>>>()?;

        let sort = self
            .sort_by
            .as_deref()
            .map(SortField::parse)
            .transpose()?
            .map(|field| JobSort {
                field,
                descending: self.descending,
            });

        let page = match (self.page_number, self.page_size) {
            (None, None) => None,
            (number, Some(size)) => Some(Page::new(number.unwrap_or(1), size)?),
            (Some(_), None) => {
                return Err(AdapterError::InvalidArgument(
                    "page_number requires page_size".to_string(),
                ));
            }
        };

        Ok(JobListRequest {
            accounts: self.accounts,
            users: self.users,
            states,
            job_id: self.job_id,
            job_name: self.job_name,
            submit_time: self.submit_time,
            end_time: self.end_time,
            sort,
            page,
            fields: JobField::parse_list(&self.fields)?,
        })
    }
}

/// SubmitJob
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub user: String,
    #[serde(flatten)]
    pub spec: JobSpec,
}

/// SubmitScriptAsJob
#[derive(Debug, Deserialize)]
pub struct SubmitScriptRequest {
    pub user: String,
    pub script: String,
    /// Path of the script on the cluster; its directory becomes the working directory.
    #[serde(default)]
    pub script_path: Option<String>,
}

/// CancelJob
#[derive(Debug, Deserialize)]
pub struct CancelJobRequest {
    pub job_id: i64,
    pub user: String,
}

/// QueryJobTimeLimit
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: i64,
}

/// ChangeJobTimeLimit
#[derive(Debug, Deserialize)]
pub struct ChangeTimeLimitRequest {
    pub job_id: i64,
    /// Minutes to add; negative shortens.
    pub delta_minutes: i64,
}

/// GetClusterNodesInfo
#[derive(Debug, Default, Deserialize)]
pub struct NodesRequest {
    /// Node names; empty means every node.
    #[serde(default)]
    pub nodes: Vec<String>,
}

// ── Responses ─────────────────────────────────────────────────────────────

/// GET /health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// NOT_FOUND, ALREADY_EXISTS, INVALID_ARGUMENT, INTERNAL or UNKNOWN.
    pub code: String,
}

/// Mutations without a payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// ListAccounts
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountsResponse {
    pub accounts: Vec<String>,
}

/// QueryAccountBlockStatus, QueryUserInAccountBlockStatus
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockStatusResponse {
    pub blocked: bool,
}

/// GetAllAccountsWithUsers
#[derive(Debug, Serialize)]
pub struct AccountsWithUsersResponse {
    pub accounts: Vec<AccountWithUsers>,
}

/// SubmitJob
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: i64,
    /// The sbatch script handed to the scheduler.
    pub generated_script: String,
}

/// SubmitScriptAsJob
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitScriptResponse {
    pub job_id: i64,
}

/// QueryJobTimeLimit
#[derive(Debug, Serialize, Deserialize)]
pub struct TimeLimitResponse {
    pub job_id: i64,
    /// Minutes; -1 when unlimited.
    pub time_limit_minutes: i64,
}

/// GetClusterConfig
#[derive(Debug, Serialize)]
pub struct ClusterConfigResponse {
    pub partitions: Vec<PartitionConfig>,
}

/// GetAvailablePartitions
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailablePartitionsResponse {
    pub partitions: Vec<String>,
}

/// GetClusterNodesInfo
#[derive(Debug, Serialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeSummary>,
}

/// GetClusterInfo
#[derive(Debug, Serialize)]
pub struct ClusterInfoResponse {
    pub partitions: Vec<PartitionUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_jobs_request_conversion() {
        let req: GetJobsRequest = serde_json::from_str(
            r#"{"users":["alice"],"states":["RUNNING","canceled"],"sort_by":"submit_time",
                "descending":true,"page_number":2,"page_size":50,"fields":["job_id","state"]}"#,
        )
        .unwrap();
        let request = req.into_request().unwrap();

        assert_eq!(request.states, vec![JobState::Running, JobState::Cancelled]);
        assert_eq!(
            request.sort,
            Some(JobSort {
                field: SortField::SubmitTime,
                descending: true
            })
        );
        assert_eq!(request.page.unwrap().offset(), 50);
        assert_eq!(request.fields, vec![JobField::JobId, JobField::State]);
    }

    #[test]
    fn test_get_jobs_request_rejects_unknown_names() {
        let bad_state = GetJobsRequest {
            states: vec!["FINISHED".into()],
            ..Default::default()
        };
        assert!(bad_state.into_request().is_err());

        let bad_sort = GetJobsRequest {
            sort_by: Some("1; DROP TABLE".into()),
            ..Default::default()
        };
        assert!(bad_sort.into_request().is_err());

        let bad_field = GetJobsRequest {
            fields: vec!["password".into()],
            ..Default::default()
        };
        assert!(bad_field.into_request().is_err());

        let no_size = GetJobsRequest {
            page_number: Some(2),
            ..Default::default()
        };
        assert!(no_size.into_request().is_err());
    }

    #[test]
    fn test_submit_job_request_flattens_spec() {
        let req: SubmitJobRequest = serde_json::from_str(
            r#"{"user":"alice","account":"acme","partition":"compute","nodes":1,
                "cpus_per_task":4,"script":"srun hostname"}"#,
        )
        .unwrap();
        assert_eq!(req.user, "alice");
        assert_eq!(req.spec.cpus_per_task, 4);
        assert_eq!(req.spec.qos, None);
    }
}
