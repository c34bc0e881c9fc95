//! JSON/HTTP gateway for Slurm job, account and partition management.
//!
//! Every operation is `POST /v1/<Operation>` with a JSON body; failures are
//! rendered as `{ "error": ..., "code": ... }` with a matching status.

pub mod auth;
pub mod types;

use std::future::Future;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method},
    middleware,
    routing::post,
};
use schedbridge_slurm::{AclUpdate, JobField, JobInfo, JobList, SlurmAdapter};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::health;
use crate::metrics::Metrics;

use auth::AuthState;
use types::*;

// ── Shared application state ──────────────────────────────────────────────

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub adapter: SlurmAdapter,
    pub metrics: Metrics,
    pub auth: AuthState,
}

impl AppState {
    /// Run one operation, recording its outcome and duration.
    async fn call<T, F>(&self, method: &'static str, op: F) -> Result<Json<T>, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let started = Instant::now();
        let result = op.await;
        let code = match &result {
            Ok(_) => "OK",
            Err(e) => e.code.as_str(),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_rpc(method, code, elapsed_ms);
        if let Err(e) = &result {
            tracing::warn!(method, code, error = %e.message, "RPC failed");
        }
        result.map(Json)
    }
}

/// Router settings taken from the server configuration.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Comma-separated list of allowed origins, or `"*"`.
    pub cors_origins: String,
    pub request_timeout: Duration,
    pub metrics_enabled: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            cors_origins: "*".to_string(),
            request_timeout: Duration::from_secs(300),
            metrics_enabled: true,
        }
    }
}

// ── Router construction ───────────────────────────────────────────────────

/// Build the Axum router for the gateway.
pub fn rest_router(state: AppState, options: &RouterOptions) -> Router {
    let api = Router::new()
        .route("/v1/ListAccounts", post(list_accounts))
        .route("/v1/CreateAccount", post(create_account))
        .route("/v1/BlockAccount", post(block_account))
        .route("/v1/UnblockAccount", post(unblock_account))
        .route("/v1/QueryAccountBlockStatus", post(query_account_block_status))
        .route("/v1/GetAllAccountsWithUsers", post(get_all_accounts_with_users))
        .route("/v1/AddUserToAccount", post(add_user_to_account))
        .route("/v1/RemoveUserFromAccount", post(remove_user_from_account))
        .route("/v1/BlockUserInAccount", post(block_user_in_account))
        .route("/v1/UnblockUserInAccount", post(unblock_user_in_account))
        .route(
            "/v1/QueryUserInAccountBlockStatus",
            post(query_user_in_account_block_status),
        )
        .route("/v1/GetJobById", post(get_job_by_id))
        .route("/v1/GetJobs", post(get_jobs))
        .route("/v1/SubmitJob", post(submit_job))
        .route("/v1/SubmitScriptAsJob", post(submit_script_as_job))
        .route("/v1/CancelJob", post(cancel_job))
        .route("/v1/QueryJobTimeLimit", post(query_job_time_limit))
        .route("/v1/ChangeJobTimeLimit", post(change_job_time_limit))
        .route("/v1/GetClusterConfig", post(get_cluster_config))
        .route("/v1/GetAvailablePartitions", post(get_available_partitions))
        .route("/v1/GetClusterNodesInfo", post(get_cluster_nodes_info))
        .route("/v1/GetClusterInfo", post(get_cluster_info))
        .layer(middleware::from_fn(auth::bearer_auth))
        .layer(axum::Extension(state.auth.clone()))
        .with_state(state.clone());

    api.merge(health::health_router(state.metrics, options.metrics_enabled))
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(build_cors_layer(&options.cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    if origins == "*" {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        layer.allow_origin(allowed)
    }
}

fn record_acl_update(state: &AppState, update: &AclUpdate) {
    state.metrics.record_acl_writes(update.partitions_written.len());
}

// ── Accounts ──────────────────────────────────────────────────────────────

async fn list_accounts(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<AccountsResponse>, ApiError> {
    state
        .call("ListAccounts", async {
            let accounts = state.adapter.list_accounts(&req.user).await?;
            Ok(AccountsResponse { accounts })
        })
        .await
}

async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .call("CreateAccount", async {
            state.adapter.create_account(&req.account, &req.owner).await?;
            Ok(SuccessResponse::ok())
        })
        .await
}

async fn block_account(
    State(state): State<AppState>,
    Json(req): Json<AccountRequest>,
) -> Result<Json<AclUpdate>, ApiError> {
    state
        .call("BlockAccount", async {
            let update = state.adapter.block_account(&req.account).await?;
            record_acl_update(&state, &update);
            Ok(update)
        })
        .await
}

async fn unblock_account(
    State(state): State<AppState>,
    Json(req): Json<AccountRequest>,
) -> Result<Json<AclUpdate>, ApiError> {
    state
        .call("UnblockAccount", async {
            let update = state.adapter.unblock_account(&req.account).await?;
            record_acl_update(&state, &update);
            Ok(update)
        })
        .await
}

async fn query_account_block_status(
    State(state): State<AppState>,
    Json(req): Json<AccountRequest>,
) -> Result<Json<BlockStatusResponse>, ApiError> {
    state
        .call("QueryAccountBlockStatus", async {
            let blocked = state.adapter.query_account_block_status(&req.account).await?;
            Ok(BlockStatusResponse { blocked })
        })
        .await
}

async fn get_all_accounts_with_users(
    State(state): State<AppState>,
) -> Result<Json<AccountsWithUsersResponse>, ApiError> {
    state
        .call("GetAllAccountsWithUsers", async {
            let accounts = state.adapter.get_all_accounts_with_users().await?;
            Ok(AccountsWithUsersResponse { accounts })
        })
        .await
}

async fn add_user_to_account(
    State(state): State<AppState>,
    Json(req): Json<UserAccountRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .call("AddUserToAccount", async {
            state.adapter.add_user_to_account(&req.user, &req.account).await?;
            Ok(SuccessResponse::ok())
        })
        .await
}

async fn remove_user_from_account(
    State(state): State<AppState>,
    Json(req): Json<UserAccountRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .call("RemoveUserFromAccount", async {
            state
                .adapter
                .remove_user_from_account(&req.user, &req.account)
                .await?;
            Ok(SuccessResponse::ok())
        })
        .await
}

async fn block_user_in_account(
    State(state): State<AppState>,
    Json(req): Json<UserAccountRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .call("BlockUserInAccount", async {
            state
                .adapter
                .block_user_in_account(&req.user, &req.account)
                .await?;
            Ok(SuccessResponse::ok())
        })
        .await
}

async fn unblock_user_in_account(
    State(state): State<AppState>,
    Json(req): Json<UserAccountRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .call("UnblockUserInAccount", async {
            state
                .adapter
                .unblock_user_in_account(&req.user, &req.account)
                .await?;
            Ok(SuccessResponse::ok())
        })
        .await
}

async fn query_user_in_account_block_status(
    State(state): State<AppState>,
    Json(req): Json<UserAccountRequest>,
) -> Result<Json<BlockStatusResponse>, ApiError> {
    state
        .call("QueryUserInAccountBlockStatus", async {
            let blocked = state
                .adapter
                .query_user_in_account_block_status(&req.user, &req.account)
                .await?;
            Ok(BlockStatusResponse { blocked })
        })
        .await
}

// ── Jobs ──────────────────────────────────────────────────────────────────

async fn get_job_by_id(
    State(state): State<AppState>,
    Json(req): Json<GetJobByIdRequest>,
) -> Result<Json<JobInfo>, ApiError> {
    state
        .call("GetJobById", async {
            let fields = JobField::parse_list(&req.fields)?;
            Ok(state.adapter.get_job_by_id(req.job_id, &fields).await?)
        })
        .await
}

async fn get_jobs(
    State(state): State<AppState>,
    Json(req): Json<GetJobsRequest>,
) -> Result<Json<JobList>, ApiError> {
    state
        .call("GetJobs", async {
            let request = req.into_request()?;
            let list = state.adapter.get_jobs(&request).await?;
            if list.skipped > 0 {
                state.metrics.record_skipped_rows(list.skipped);
            }
            Ok(list)
        })
        .await
}

async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, ApiError> {
    state
        .call("SubmitJob", async {
            let submitted = state.adapter.submit_job(&req.user, &req.spec).await?;
            tracing::info!(
                job_id = submitted.job_id,
                user = %req.user,
                account = %req.spec.account,
                "Job submitted"
            );
            Ok(SubmitJobResponse {
                job_id: submitted.job_id,
                generated_script: submitted.script,
            })
        })
        .await
}

async fn submit_script_as_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitScriptRequest>,
) -> Result<Json<SubmitScriptResponse>, ApiError> {
    state
        .call("SubmitScriptAsJob", async {
            let job_id = state
                .adapter
                .submit_script_as_job(&req.user, &req.script, req.script_path.as_deref())
                .await?;
            tracing::info!(job_id, user = %req.user, "Script submitted");
            Ok(SubmitScriptResponse { job_id })
        })
        .await
}

async fn cancel_job(
    State(state): State<AppState>,
    Json(req): Json<CancelJobRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .call("CancelJob", async {
            state.adapter.cancel_job(req.job_id, &req.user).await?;
            Ok(SuccessResponse::ok())
        })
        .await
}

async fn query_job_time_limit(
    State(state): State<AppState>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<TimeLimitResponse>, ApiError> {
    state
        .call("QueryJobTimeLimit", async {
            let time_limit_minutes = state.adapter.query_job_time_limit(req.job_id).await?;
            Ok(TimeLimitResponse {
                job_id: req.job_id,
                time_limit_minutes,
            })
        })
        .await
}

async fn change_job_time_limit(
    State(state): State<AppState>,
    Json(req): Json<ChangeTimeLimitRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .call("ChangeJobTimeLimit", async {
            state
                .adapter
                .change_job_time_limit(req.job_id, req.delta_minutes)
                .await?;
            Ok(SuccessResponse::ok())
        })
        .await
}

// ── Cluster ───────────────────────────────────────────────────────────────

async fn get_cluster_config(
    State(state): State<AppState>,
) -> Result<Json<ClusterConfigResponse>, ApiError> {
    state
        .call("GetClusterConfig", async {
            let partitions = state.adapter.get_cluster_config().await?;
            Ok(ClusterConfigResponse { partitions })
        })
        .await
}

async fn get_available_partitions(
    State(state): State<AppState>,
    Json(req): Json<UserAccountRequest>,
) -> Result<Json<AvailablePartitionsResponse>, ApiError> {
    state
        .call("GetAvailablePartitions", async {
            let partitions = state
                .adapter
                .get_available_partitions(&req.user, &req.account)
                .await?;
            Ok(AvailablePartitionsResponse { partitions })
        })
        .await
}

async fn get_cluster_nodes_info(
    State(state): State<AppState>,
    Json(req): Json<NodesRequest>,
) -> Result<Json<NodesResponse>, ApiError> {
    state
        .call("GetClusterNodesInfo", async {
            let nodes = state.adapter.get_cluster_nodes_info(&req.nodes).await?;
            Ok(NodesResponse { nodes })
        })
        .await
}

async fn get_cluster_info(
    State(state): State<AppState>,
) -> Result<Json<ClusterInfoResponse>, ApiError> {
    state
        .call("GetClusterInfo", async {
            let partitions = state.adapter.get_cluster_info().await?;
            Ok(ClusterInfoResponse { partitions })
        })
        .await
}
