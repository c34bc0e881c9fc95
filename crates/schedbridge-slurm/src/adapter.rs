//! The adapter: every dependency of the RPC operations in one explicit value.
//!
//! Operations are implemented across [`crate::accounts`], [`crate::acl`],
//! [`crate::jobs`], [`crate::query`] and [`crate::cluster`] as inherent
//! methods of [`SlurmAdapter`].

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::accounting::AccountingStore;
use crate::acl::AclLocks;
use crate::control::SchedulerControlPort;
use crate::error::{AdapterError, AdapterResult};
use crate::identity::IdentityResolver;
use crate::live::SchedulerQueryPort;

/// Longest accepted identifier.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Check an identifier against the whitelist `[A-Za-z0-9_.-]{1,64}`, not
/// starting with `-`.
///
/// Everything that ends up on a command line or in a table name goes
/// through this check first.
pub fn validate_identifier(field: &'static str, value: &str) -> AdapterResult<()> {
    let valid = !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LEN
        && !value.starts_with('-')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(AdapterError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

/// Per-cluster settings consumed by the core.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Cluster name as known to slurmdbd; prefixes the per-cluster tables.
    pub name: String,
    /// QOS used when a submission does not name one.
    pub default_qos: String,
    /// Free-text comment per partition, reported by the cluster config.
    pub partition_comments: FxHashMap<String, String>,
    /// Optimistic ACL update attempts before giving up.
    pub acl_max_attempts: u32,
}

impl ClusterSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_qos: "normal".to_string(),
            partition_comments: FxHashMap::default(),
            acl_max_attempts: 3,
        }
    }
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Slurm job, account and partition management.
#[derive(Clone)]
pub struct SlurmAdapter {
    pub(crate) settings: ClusterSettings,
    pub(crate) store: Arc<dyn AccountingStore>,
    pub(crate) live: Arc<dyn SchedulerQueryPort>,
    pub(crate) control: Arc<dyn SchedulerControlPort>,
    pub(crate) identity: Arc<dyn IdentityResolver>,
    pub(crate) acl_locks: Arc<AclLocks>,
    clock: Clock,
}

impl SlurmAdapter {
    pub fn new(
        settings: ClusterSettings,
        store: Arc<dyn AccountingStore>,
        live: Arc<dyn SchedulerQueryPort>,
        control: Arc<dyn SchedulerControlPort>,
        identity: Arc<dyn IdentityResolver>,
    ) -> AdapterResult<Self> {
        validate_identifier("cluster", &settings.name)?;
        validate_identifier("default_qos", &settings.default_qos)?;
        Ok(Self {
            settings,
            store,
            live,
            control,
            identity,
            acl_locks: Arc::new(AclLocks::new()),
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
        })
    }

    /// Share an ACL lock registry with other adapters of the same process.
    pub fn with_acl_locks(mut self, locks: Arc<AclLocks>) -> Self {
        self.acl_locks = locks;
        self
    }

    /// Replace the wall clock (Unix seconds).
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    pub(crate) fn now(&self) -> i64 {
        (self.clock)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        for ok in ["acme", "alice.smith", "proj_01", "a-b", "A"] {
            assert!(validate_identifier("account", ok).is_ok(), "{ok}");
        }
        let too_long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        for bad in ["", "-rf", "a b", "a;b", "a/b", "ünïcode", "a$b", too_long.as_str()] {
            let err = validate_identifier("account", bad).unwrap_err();
            assert!(
                matches!(err, AdapterError::InvalidIdentifier { field: "account", .. }),
                "{bad}"
            );
        }
        assert!(validate_identifier("account", &"a".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn test_cluster_settings_defaults() {
        let settings = ClusterSettings::new("linux");
        assert_eq!(settings.default_qos, "normal");
        assert_eq!(settings.acl_max_attempts, 3);
        assert!(settings.partition_comments.is_empty());
    }
}
