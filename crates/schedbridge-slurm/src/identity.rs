//! Username ↔ uid resolution.
//!
//! The job table stores numeric uids while clients speak usernames.

/// Resolves system accounts.
pub trait IdentityResolver: Send + Sync {
    /// uid of a username, `None` if the user does not exist on this host.
    fn uid_of(&self, user: &str) -> Option<u32>;

    /// Username of a uid, `None` if unknown.
    fn name_of(&self, uid: u32) -> Option<String>;

    /// Username of a uid, or the uid itself when it has no passwd entry.
    fn display_name(&self, uid: i64) -> String {
        u32::try_from(uid)
            .ok()
            .and_then(|uid| self.name_of(uid))
            .unwrap_or_else(|| uid.to_string())
    }
}

/// Resolver backed by the host's passwd database (NSS).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentity;

impl IdentityResolver for SystemIdentity {
    fn uid_of(&self, user: &str) -> Option<u32> {
        users::get_user_by_name(user).map(|u| u.uid())
    }

    fn name_of(&self, uid: u32) -> Option<String> {
        users::get_user_by_uid(uid).map(|u| u.name().to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_resolves_both_ways() {
        let identity = SystemIdentity;
        assert_eq!(identity.uid_of("root"), Some(0));
        assert_eq!(identity.name_of(0).as_deref(), Some("root"));
    }

    #[test]
    fn test_display_name_falls_back_to_uid() {
        let identity = SystemIdentity;
        assert_eq!(identity.display_name(0), "root");
        assert_eq!(identity.display_name(3_999_999_999), "3999999999");
        assert_eq!(identity.display_name(-5), "-5");
    }
}
