//! Job submission, lookup and listing against in-memory Slurm state.

use schedbridge_slurm::testing::{ControlCall, FakeScheduler, Harness, MemoryStore, StaticIdentity};
use schedbridge_slurm::{
    AccessList, AdapterError, ErrorCode, JobField, JobListRequest, JobRecord, JobSort, JobSpec,
    JobState, LiveJobRow, NodeInfo, NodeState, Page, SortField, TimeRange,
};

/// Clock of the harness.
const NOW: i64 = 1_700_000_600;

fn identity() -> StaticIdentity {
    StaticIdentity::new([("alice", 1001), ("bob", 1002)])
}

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_association("alice", "acme", None)
        .with_association("bob", "beta", None)
}

fn record(job_id: i64, state: JobState, user_id: i64) -> JobRecord {
    JobRecord {
        job_id,
        name: format!("job{job_id}"),
        user_id,
        account: "acme".into(),
        partition: "compute".into(),
        qos: "normal".into(),
        state: state.code(),
        time_submit: 1_700_000_000 + job_id,
        time_limit: 60,
        tres_req: "1=4,2=8000,4=1".into(),
        ..Default::default()
    }
}

fn live_row(job_id: i64, user: &str, state: JobState) -> LiveJobRow {
    LiveJobRow {
        job_id,
        name: format!("job{job_id}"),
        user: user.into(),
        account: "acme".into(),
        partition: "compute".into(),
        qos: "normal".into(),
        state,
        node_count: 1,
        cpu_count: 8,
        gpu_count: 1,
        gres: "gpu:1".into(),
        reason: "None".into(),
        work_dir: "/home/alice".into(),
        node_list: "cn01".into(),
        time_limit_minutes: Some(120),
        elapsed_seconds: 300,
        start_time: NOW - 300,
    }
}

#[tokio::test]
async fn test_submitted_job_is_reported_pending() {
    let h = Harness::new(
        store(),
        FakeScheduler::new().with_partition("compute", AccessList::All),
        identity(),
    );
    let spec = JobSpec {
        name: "prep".into(),
        account: "acme".into(),
        partition: "compute".into(),
        nodes: 1,
        cpus_per_task: 1,
        script: "echo hello\n".into(),
        ..Default::default()
    };

    let submitted = h.adapter.submit_job("alice", &spec).await.unwrap();
    let job_id = submitted.job_id;
    for directive in ["--nodes=1", "--cpus-per-task=1", "--qos=normal"] {
        assert!(submitted.script.contains(directive), "{directive}");
    }

    let calls = h.control.calls();
    let ControlCall::Submit(submission) = &calls[0] else {
        panic!("expected a submission, got {calls:?}");
    };
    assert_eq!(submission.user, "alice");
    for directive in [
        "#SBATCH --account=acme\n",
        "#SBATCH --partition=compute\n",
        "#SBATCH --qos=normal\n",
        "#SBATCH --nodes=1\n",
        "#SBATCH --cpus-per-task=1\n",
    ] {
        assert!(submission.script.contains(directive), "{directive}");
    }

    let job = h.adapter.get_job_by_id(job_id, &[]).await.unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.reason, "Priority");
    assert_eq!(job.user, "alice");
    assert_eq!(job.cpus_req, 1);
    assert_eq!(job.nodes_req, 1);
    assert_eq!(job.cpus_alloc, 0);
    assert_eq!(job.time_limit_minutes, -1);
    assert_eq!(h.adapter.query_job_time_limit(job_id).await.unwrap(), -1);
}

#[tokio::test]
async fn test_submit_rejects_bad_identifiers_before_running_anything() {
    let h = Harness::new(store(), FakeScheduler::new(), identity());
    let spec = JobSpec {
        account: "acme".into(),
        partition: "compute --uid=0".into(),
        script: "true".into(),
        ..Default::default()
    };

    let err = h.adapter.submit_job("alice", &spec).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(h.control.calls().is_empty());
}

#[tokio::test]
async fn test_scheduler_rejection_is_unknown_with_message() {
    let h = Harness::new(store(), FakeScheduler::new(), identity());
    h.control
        .reject_jobs("sbatch: error: Batch job submission failed: Invalid account");

    let err = h
        .adapter
        .submit_script_as_job("alice", "#!/bin/bash\ntrue\n", Some("/home/alice/run.sh"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Unknown);
    assert_eq!(
        err.to_string(),
        "sbatch: error: Batch job submission failed: Invalid account"
    );
}

#[tokio::test]
async fn test_get_job_by_id_terminal_and_missing() {
    let mut done = record(10, JobState::Completed, 1001);
    done.time_start = 1_000;
    done.time_end = 1_300;
    done.tres_alloc = "1=4,2=8000,4=1,1001=2".into();
    let h = Harness::new(store().with_job(done), FakeScheduler::new(), identity());

    let job = h.adapter.get_job_by_id(10, &[]).await.unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.reason, "end of job");
    assert_eq!(job.elapsed_seconds, 300);
    assert_eq!(job.gpus_alloc, 2);
    assert_eq!(job.mem_alloc_mb, 8000);

    let projected = h
        .adapter
        .get_job_by_id(10, &[JobField::JobId, JobField::State])
        .await
        .unwrap();
    assert_eq!(projected.job_id, 10);
    assert_eq!(projected.state, JobState::Completed);
    assert_eq!(projected.name, "");
    assert_eq!(projected.cpus_req, 0);

    let err = h.adapter.get_job_by_id(99, &[]).await.unwrap_err();
    assert!(matches!(err, AdapterError::JobNotFound(99)));
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_gpus_not_reported_without_tres_select_plugin() {
    let mut running = record(11, JobState::Running, 1001);
    running.time_start = NOW - 60;
    running.tres_alloc = "1=4,4=1,1001=2".into();
    let h = Harness::new(
        store().with_job(running),
        FakeScheduler::new()
            .with_select_type("select/linear")
            .with_reason(11, JobState::Running, "None"),
        identity(),
    );

    let job = h.adapter.get_job_by_id(11, &[]).await.unwrap();

    assert_eq!(job.reason, "Running");
    assert_eq!(job.elapsed_seconds, 60);
    assert_eq!(job.cpus_alloc, 4);
    assert_eq!(job.gpus_alloc, 0);
}

#[tokio::test]
async fn test_store_listing_skips_jobs_the_controller_forgot() {
    let mut done = record(10, JobState::Completed, 1001);
    done.time_start = 1_000;
    done.time_end = 1_100;
    let mut running = record(11, JobState::Running, 1001);
    running.time_start = NOW - 600;
    let h = Harness::new(
        store()
            .with_job(done)
            .with_job(running)
            .with_job(record(12, JobState::Pending, 1001))
            .with_job(record(13, JobState::Pending, 1002)),
        FakeScheduler::new()
            .with_reason(11, JobState::Running, "None")
            .with_reason(12, JobState::Pending, "Resources"),
        identity(),
    );

    let list = h.adapter.get_jobs(&JobListRequest::default()).await.unwrap();

    let ids: Vec<i64> = list.jobs.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![10, 11, 12]);
    assert_eq!(list.skipped, 1);
    assert_eq!(list.jobs[0].reason, "end of job");
    assert_eq!(list.jobs[1].elapsed_seconds, 600);
    assert_eq!(list.jobs[2].reason, "Resources");
    assert_eq!(list.jobs[2].user, "alice");
}

#[tokio::test]
async fn test_store_listing_keeps_jobs_in_transitional_states() {
    let mut completing = record(31, JobState::Running, 1001);
    completing.time_start = NOW - 120;
    let h = Harness::new(
        store()
            .with_job(completing)
            .with_job(record(32, JobState::Pending, 1001)),
        FakeScheduler::new()
            .with_transitional_job(31, "None")
            .with_transitional_job(32, "None"),
        identity(),
    );

    let list = h.adapter.get_jobs(&JobListRequest::default()).await.unwrap();

    let ids: Vec<i64> = list.jobs.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![31, 32]);
    assert_eq!(list.skipped, 0);
    assert_eq!(list.jobs[0].state, JobState::Running);
    assert_eq!(list.jobs[0].elapsed_seconds, 120);
}

#[tokio::test]
async fn test_state_filter_ignores_flag_bits() {
    // A pending job with a flag bit set in the stored state word.
    let mut flagged = record(21, JobState::Pending, 1001);
    flagged.state = 0x400;
    let h = Harness::new(
        store()
            .with_job(flagged)
            .with_job(record(22, JobState::Running, 1001)),
        FakeScheduler::new()
            .with_reason(21, JobState::Pending, "Resources")
            .with_reason(22, JobState::Running, "None"),
        identity(),
    );

    let job = h.adapter.get_job_by_id(21, &[]).await.unwrap();
    assert_eq!(job.state, JobState::Pending);

    let request = JobListRequest {
        states: vec![JobState::Pending],
        ..Default::default()
    };
    let list = h.adapter.get_jobs(&request).await.unwrap();
    let ids: Vec<i64> = list.jobs.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![21]);
    assert_eq!(list.jobs[0].reason, "Resources");
}

#[tokio::test]
async fn test_store_listing_filters_sorts_and_pages() {
    let mut jobs = store();
    for id in 1..=5 {
        let mut job = record(id, JobState::Completed, if id % 2 == 0 { 1002 } else { 1001 });
        job.time_end = 1_700_001_000 + id;
        jobs = jobs.with_job(job);
    }
    let h = Harness::new(jobs, FakeScheduler::new(), identity());

    let request = JobListRequest {
        users: vec!["alice".into()],
        sort: Some(JobSort {
            field: SortField::JobId,
            descending: true,
        }),
        page: Some(Page::new(1, 2).unwrap()),
        ..Default::default()
    };
    let list = h.adapter.get_jobs(&request).await.unwrap();
    let ids: Vec<i64> = list.jobs.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![5, 3]);
    assert_eq!(list.total_count, 3);

    let request = JobListRequest {
        submit_time: Some(TimeRange {
            start: Some(1_700_000_002),
            end: Some(1_700_000_003),
        }),
        ..Default::default()
    };
    let list = h.adapter.get_jobs(&request).await.unwrap();
    let ids: Vec<i64> = list.jobs.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![2, 3]);

    let request = JobListRequest {
        users: vec!["nobody".into()],
        ..Default::default()
    };
    let list = h.adapter.get_jobs(&request).await.unwrap();
    assert!(list.jobs.is_empty());
    assert_eq!(list.total_count, 0);
}

#[tokio::test]
async fn test_in_flight_listing_reads_the_controller() {
    let h = Harness::new(
        store().with_job(record(21, JobState::Running, 1001)),
        FakeScheduler::new()
            .with_live_job(live_row(21, "alice", JobState::Running))
            .with_live_job(live_row(22, "alice", JobState::Pending))
            .with_live_job(live_row(23, "bob", JobState::Running)),
        identity(),
    );
    let request = JobListRequest {
        users: vec!["alice".into()],
        states: vec![JobState::Running, JobState::Pending],
        ..Default::default()
    };

    let list = h.adapter.get_jobs(&request).await.unwrap();

    let ids: Vec<i64> = list.jobs.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![21, 22]);
    assert_eq!(list.total_count, 2);

    let running = &list.jobs[0];
    assert_eq!(running.reason, "Running");
    assert_eq!(running.submit_time, 1_700_000_021);
    assert_eq!(running.cpus_alloc, 8);
    assert_eq!(running.gpus_alloc, 1);
    assert_eq!(running.time_limit_minutes, 120);

    let pending = &list.jobs[1];
    assert_eq!(pending.submit_time, 0);
    assert_eq!(pending.cpus_req, 8);
    assert_eq!(pending.cpus_alloc, 0);
}

#[tokio::test]
async fn test_unreachable_controller_fails_the_listing() {
    let h = Harness::new(
        store().with_job(record(30, JobState::Pending, 1001)),
        FakeScheduler::new(),
        identity(),
    );
    h.scheduler.set_unreachable(true);

    let err = h.adapter.get_jobs(&JobListRequest::default()).await.unwrap_err();

    assert!(matches!(err, AdapterError::ControllerUnreachable(_)));
    assert_eq!(err.code(), ErrorCode::Internal);
}

#[tokio::test]
async fn test_cancel_and_time_limit_changes() {
    let h = Harness::new(
        store().with_job(record(40, JobState::Running, 1001)),
        FakeScheduler::new(),
        identity(),
    );

    assert_eq!(h.adapter.query_job_time_limit(40).await.unwrap(), 60);

    let err = h.adapter.change_job_time_limit(40, 0).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    h.adapter.change_job_time_limit(40, -15).await.unwrap();
    h.adapter.cancel_job(40, "alice").await.unwrap();

    let err = h.adapter.cancel_job(41, "alice").await.unwrap_err();
    assert!(matches!(err, AdapterError::JobNotFound(41)));

    assert_eq!(
        h.control.calls(),
        vec![
            ControlCall::ChangeTimeLimit {
                job_id: 40,
                delta_minutes: -15
            },
            ControlCall::Cancel {
                job_id: 40,
                user: "alice".into()
            },
        ]
    );
}

fn node(name: &str, partitions: &[&str], raw: &str, cpus: (i64, i64), gpus: (i64, i64)) -> NodeInfo {
    NodeInfo {
        name: name.into(),
        partitions: partitions.iter().map(|p| p.to_string()).collect(),
        raw_state: raw.into(),
        state: NodeState::classify(raw),
        cpus_total: cpus.0,
        cpus_alloc: cpus.1,
        mem_total_mb: 128_000,
        mem_alloc_mb: 0,
        gpus_total: gpus.0,
        gpus_alloc: gpus.1,
    }
}

#[tokio::test]
async fn test_cluster_usage_per_partition() {
    let h = Harness::new(
        store(),
        FakeScheduler::new()
            .with_partition("compute", AccessList::All)
            .with_partition("gpu", AccessList::All)
            .with_node(node("cn01", &["compute"], "IDLE", (32, 0), (0, 0)))
            .with_node(node("cn02", &["compute"], "MIXED", (32, 16), (0, 0)))
            .with_node(node("cn03", &["compute"], "DOWN*", (32, 0), (0, 0)))
            .with_node(node("gn01", &["gpu"], "ALLOCATED", (64, 64), (4, 4)))
            .with_live_job(live_row(50, "alice", JobState::Running))
            .with_live_job(live_row(51, "alice", JobState::Pending)),
        identity(),
    );

    let usage = h.adapter.get_cluster_info().await.unwrap();

    let compute = &usage[0];
    assert_eq!(compute.partition, "compute");
    assert_eq!(compute.nodes_total, 3);
    assert_eq!(compute.nodes_idle, 1);
    assert_eq!(compute.nodes_mixed, 1);
    assert_eq!(compute.nodes_unavailable, 1);
    assert_eq!(compute.cpus_alloc, 16);
    assert_eq!(compute.cpus_idle, 48);
    assert_eq!(compute.running_jobs, 1);
    assert_eq!(compute.pending_jobs, 1);
    assert_eq!(compute.utilization, 25.0);

    let gpu = &usage[1];
    assert_eq!(gpu.nodes_allocated, 1);
    assert_eq!(gpu.gpus_alloc, 4);
    assert_eq!(gpu.gpus_idle, 0);
    assert_eq!(gpu.utilization, 100.0);

    let nodes = h
        .adapter
        .get_cluster_nodes_info(&["gn01".to_string()])
        .await
        .unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].cpus_idle, 0);

    let err = h
        .adapter
        .get_cluster_nodes_info(&["zz99".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_cluster_config_and_available_partitions() {
    let h = Harness::new(
        store().with_qos("high"),
        FakeScheduler::new()
            .with_partition("compute", AccessList::All)
            .with_partition("restricted", AccessList::List(vec!["beta".into()])),
        identity(),
    );

    let config = h.adapter.get_cluster_config().await.unwrap();
    assert_eq!(config.len(), 2);
    assert_eq!(config[0].qos, vec!["normal", "high"]);
    assert_eq!(config[0].cores, 64);

    assert_eq!(
        h.adapter.get_available_partitions("alice", "acme").await.unwrap(),
        vec!["compute"]
    );
    assert_eq!(
        h.adapter.get_available_partitions("bob", "beta").await.unwrap(),
        vec!["compute", "restricted"]
    );

    let err = h
        .adapter
        .get_available_partitions("alice", "beta")
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AssociationNotFound { .. }));
}
