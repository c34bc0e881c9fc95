//! Account and user blocking against in-memory Slurm state.
//!
//! The accounting store, controller and control plane are the fakes from
//! `schedbridge_slurm::testing`; control commands are applied to them so
//! later reads observe earlier writes.

use schedbridge_slurm::testing::{
    ControlCall, FakeScheduler, Harness, MemoryStore, StaticIdentity,
};
use schedbridge_slurm::{AccessList, AdapterError, ErrorCode};

fn list(names: &[&str]) -> AccessList {
    AccessList::List(names.iter().map(|n| n.to_string()).collect())
}

fn three_accounts() -> MemoryStore {
    MemoryStore::new()
        .with_association("alice", "acme", None)
        .with_association("bob", "beta", None)
        .with_association("carol", "gamma", None)
}

fn identity() -> StaticIdentity {
    StaticIdentity::new([("alice", 1001), ("bob", 1002), ("carol", 1003)])
}

fn harness(scheduler: FakeScheduler) -> Harness {
    Harness::new(three_accounts(), scheduler, identity())
}

#[tokio::test]
async fn test_block_account_from_all_lists_remaining_accounts() {
    let h = harness(
        FakeScheduler::new()
            .with_partition("compute", AccessList::All)
            .with_partition("gpu", AccessList::All),
    );

    let update = h.adapter.block_account("acme").await.unwrap();

    assert_eq!(update.partitions_written, vec!["compute", "gpu"]);
    assert!(!update.divergent);
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["beta", "gamma"])));
    assert_eq!(h.scheduler.allow_accounts("gpu"), Some(list(&["beta", "gamma"])));
    assert!(h.adapter.query_account_block_status("acme").await.unwrap());
    assert!(!h.adapter.query_account_block_status("beta").await.unwrap());
}

#[tokio::test]
async fn test_block_account_twice_writes_once() {
    let h = harness(FakeScheduler::new().with_partition("compute", list(&["acme", "beta"])));

    let first = h.adapter.block_account("acme").await.unwrap();
    assert_eq!(first.partitions_written, vec!["compute"]);

    let second = h.adapter.block_account("acme").await.unwrap();
    assert!(second.partitions_written.is_empty());
    assert_eq!(h.control.acl_writes().len(), 1);
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["beta"])));
}

#[tokio::test]
async fn test_unblock_appends_and_all_is_untouched() {
    let h = harness(FakeScheduler::new().with_partition("compute", list(&["beta"])));
    h.adapter.unblock_account("acme").await.unwrap();
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["beta", "acme"])));

    let h = harness(FakeScheduler::new().with_partition("compute", AccessList::All));
    let update = h.adapter.unblock_account("acme").await.unwrap();
    assert!(update.partitions_written.is_empty());
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(AccessList::All));
}

#[tokio::test]
async fn test_divergent_partitions_are_reconciled_from_the_first() {
    let h = harness(
        FakeScheduler::new()
            .with_partition("compute", list(&["acme", "beta", "gamma"]))
            .with_partition("gpu", list(&["acme"])),
    );

    let update = h.adapter.block_account("beta").await.unwrap();

    assert!(update.divergent);
    assert_eq!(update.partitions_written, vec!["compute", "gpu"]);
    assert_eq!(h.scheduler.allow_accounts("gpu"), Some(list(&["acme", "gamma"])));
}

#[tokio::test]
async fn test_noop_action_still_reconciles_divergence() {
    let h = harness(
        FakeScheduler::new()
            .with_partition("compute", list(&["acme"]))
            .with_partition("gpu", list(&["beta"])),
    );

    let update = h.adapter.unblock_account("acme").await.unwrap();

    assert!(update.divergent);
    assert_eq!(update.partitions_written, vec!["gpu"]);
    assert_eq!(h.scheduler.allow_accounts("gpu"), Some(list(&["acme"])));
}

#[tokio::test]
async fn test_concurrent_change_restarts_the_update() {
    let h = harness(FakeScheduler::new().with_partition("compute", AccessList::All));
    h.scheduler
        .interfere_after_next_read("compute", list(&["acme", "beta"]));

    h.adapter.block_account("acme").await.unwrap();

    // The second attempt starts from the concurrently written list.
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["beta"])));
    assert_eq!(h.control.acl_writes(), vec![("compute".to_string(), list(&["beta"]))]);
}

#[tokio::test]
async fn test_acl_that_keeps_changing_gives_up() {
    let h = harness(FakeScheduler::new().with_partition("compute", list(&["acme"])));
    for i in 0..6 {
        h.scheduler
            .interfere_after_next_read("compute", list(&["acme", &format!("other{i}")]));
    }

    let err = h.adapter.block_account("acme").await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::Internal);
    assert!(h.control.acl_writes().is_empty());
}

#[tokio::test]
async fn test_concurrent_blocks_are_serialised() {
    let h = harness(
        FakeScheduler::new()
            .with_partition("compute", AccessList::All)
            .with_partition("gpu", AccessList::All),
    );

    let (a, b) = tokio::join!(h.adapter.block_account("acme"), h.adapter.block_account("beta"));
    a.unwrap();
    b.unwrap();

    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["gamma"])));
    assert_eq!(h.scheduler.allow_accounts("gpu"), Some(list(&["gamma"])));
}

#[tokio::test]
async fn test_failed_partition_write_is_not_rolled_back() {
    let h = harness(
        FakeScheduler::new()
            .with_partition("compute", AccessList::All)
            .with_partition("gpu", AccessList::All)
            .with_partition("debug", AccessList::All),
    );
    h.control.fail_partition("gpu");

    let err = h.adapter.block_account("acme").await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::Internal);
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["beta", "gamma"])));
    assert_eq!(h.scheduler.allow_accounts("gpu"), Some(AccessList::All));
    assert_eq!(h.scheduler.allow_accounts("debug"), Some(AccessList::All));
}

#[tokio::test]
async fn test_blocking_the_last_allowed_account_is_refused() {
    let h = harness(
        FakeScheduler::new()
            .with_partition("compute", list(&["acme"]))
            .with_partition("gpu", list(&["acme"])),
    );

    let err = h.adapter.block_account("acme").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(h.control.acl_writes().is_empty());
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["acme"])));

    // Same outcome from ALL when the cluster has no other account.
    let h = Harness::new(
        MemoryStore::new().with_association("alice", "acme", None),
        FakeScheduler::new().with_partition("compute", AccessList::All),
        identity(),
    );
    let err = h.adapter.block_account("acme").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(h.control.acl_writes().is_empty());
    assert_eq!(h.scheduler.allow_accounts("compute"), Some(AccessList::All));
}

#[tokio::test]
async fn test_block_unknown_account() {
    let h = harness(FakeScheduler::new().with_partition("compute", AccessList::All));

    let err = h.adapter.block_account("nobody").await.unwrap_err();
    assert!(matches!(err, AdapterError::AccountNotFound(_)));
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = h.adapter.block_account("acme;rm").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(h.control.calls().is_empty());
}

#[tokio::test]
async fn test_user_block_round_trip() {
    let h = harness(FakeScheduler::new().with_partition("compute", AccessList::All));

    assert!(!h
        .adapter
        .query_user_in_account_block_status("alice", "acme")
        .await
        .unwrap());

    h.adapter.block_user_in_account("alice", "acme").await.unwrap();
    assert!(h
        .adapter
        .query_user_in_account_block_status("alice", "acme")
        .await
        .unwrap());

    h.adapter.unblock_user_in_account("alice", "acme").await.unwrap();
    assert!(!h
        .adapter
        .query_user_in_account_block_status("alice", "acme")
        .await
        .unwrap());

    assert_eq!(
        h.control.calls(),
        vec![
            ControlCall::SetMaxSubmitJobs {
                user: "alice".into(),
                account: "acme".into(),
                value: 0
            },
            ControlCall::SetMaxSubmitJobs {
                user: "alice".into(),
                account: "acme".into(),
                value: -1
            },
        ]
    );
}

#[tokio::test]
async fn test_user_block_requires_association() {
    let h = harness(FakeScheduler::new().with_partition("compute", AccessList::All));

    let err = h
        .adapter
        .block_user_in_account("mallory", "acme")
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::UserNotFound(_)));

    let err = h
        .adapter
        .block_user_in_account("alice", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AccountNotFound(_)));

    let err = h
        .adapter
        .block_user_in_account("bob", "acme")
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AssociationNotFound { .. }));
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_accounts_with_users_report_both_block_levels() {
    let store = three_accounts().with_association("dave", "acme", Some(0));
    let h = Harness::new(
        store,
        FakeScheduler::new().with_partition("compute", list(&["beta", "gamma"])),
        identity(),
    );

    let accounts = h.adapter.get_all_accounts_with_users().await.unwrap();

    let acme = accounts.iter().find(|a| a.account == "acme").unwrap();
    assert!(acme.blocked);
    let users: Vec<(&str, bool)> = acme
        .users
        .iter()
        .map(|u| (u.user.as_str(), u.blocked))
        .collect();
    assert_eq!(users, vec![("alice", false), ("dave", true)]);

    let beta = accounts.iter().find(|a| a.account == "beta").unwrap();
    assert!(!beta.blocked);
}

#[tokio::test]
async fn test_create_account_starts_unblocked() {
    let h = harness(FakeScheduler::new().with_partition("compute", list(&["beta"])));

    h.adapter.create_account("delta", "alice").await.unwrap();

    assert_eq!(h.scheduler.allow_accounts("compute"), Some(list(&["beta", "delta"])));
    assert_eq!(
        h.adapter.list_accounts("alice").await.unwrap(),
        vec!["acme", "delta"]
    );

    let err = h.adapter.create_account("delta", "alice").await.unwrap_err();
    assert!(matches!(err, AdapterError::AccountExists(_)));
    assert_eq!(err.code(), ErrorCode::AlreadyExists);
}

#[tokio::test]
async fn test_add_and_remove_user() {
    let h = harness(FakeScheduler::new().with_partition("compute", AccessList::All));

    h.adapter.add_user_to_account("bob", "acme").await.unwrap();
    assert_eq!(h.adapter.list_accounts("bob").await.unwrap(), vec!["beta", "acme"]);

    let err = h.adapter.add_user_to_account("bob", "acme").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyExists);

    let err = h.adapter.add_user_to_account("bob", "nope").await.unwrap_err();
    assert!(matches!(err, AdapterError::AccountNotFound(_)));

    h.adapter.remove_user_from_account("bob", "acme").await.unwrap();
    assert_eq!(h.adapter.list_accounts("bob").await.unwrap(), vec!["beta"]);

    let err = h
        .adapter
        .remove_user_from_account("bob", "acme")
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AssociationNotFound { .. }));
}
