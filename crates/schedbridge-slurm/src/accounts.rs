//! Account and user management.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::accounting::Association;
use crate::acl::{account_blocked, AclAction};
use crate::adapter::{validate_identifier, SlurmAdapter};
use crate::error::{AdapterError, AdapterResult};

/// A user of an account and whether they may submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user: String,
    pub blocked: bool,
}

/// An account, its partition access and its users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWithUsers {
    pub account: String,
    pub blocked: bool,
    pub users: Vec<UserStatus>,
}

impl SlurmAdapter {
    pub(crate) async fn require_account(&self, account: &str) -> AdapterResult<()> {
        if self.store.account_exists(account).await? {
            Ok(())
        } else {
            Err(AdapterError::AccountNotFound(account.to_string()))
        }
    }

    pub(crate) async fn require_user(&self, user: &str) -> AdapterResult<()> {
        if self.store.user_exists(user).await? {
            Ok(())
        } else {
            Err(AdapterError::UserNotFound(user.to_string()))
        }
    }

    /// Validate both names, then require the user, the account and their link.
    pub(crate) async fn require_association(
        &self,
        user: &str,
        account: &str,
    ) -> AdapterResult<Association> {
        validate_identifier("user", user)?;
        validate_identifier("account", account)?;
        self.require_user(user).await?;
        self.require_account(account).await?;
        self.store
            .association(user, account)
            .await?
            .ok_or_else(|| AdapterError::AssociationNotFound {
                user: user.to_string(),
                account: account.to_string(),
            })
    }

    /// Accounts a user is associated with.
    #[instrument(skip(self))]
    pub async fn list_accounts(&self, user: &str) -> AdapterResult<Vec<String>> {
        validate_identifier("user", user)?;
        self.require_user(user).await?;
        let mut accounts: Vec<String> = Vec::new();
        for association in self.store.user_associations(user).await? {
            if !accounts.contains(&association.account) {
                accounts.push(association.account);
            }
        }
        Ok(accounts)
    }

    /// Create an account owned by `owner`.
    ///
    /// Under an explicit partition ACL the new account is appended so that it
    /// starts out unblocked.
    #[instrument(skip(self))]
    pub async fn create_account(&self, account: &str, owner: &str) -> AdapterResult<()> {
        validate_identifier("account", account)?;
        validate_identifier("user", owner)?;
        if self.store.account_exists(account).await? {
            return Err(AdapterError::AccountExists(account.to_string()));
        }
        self.control.create_account(account).await?;
        self.control.create_association(owner, account).await?;
        self.update_account_acl(account, AclAction::Unblock).await?;
        tracing::info!(account, owner, "Created account");
        Ok(())
    }

    /// Every account with its block flag and users.
    #[instrument(skip(self))]
    pub async fn get_all_accounts_with_users(&self) -> AdapterResult<Vec<AccountWithUsers>> {
        let (acl, accounts) = futures::try_join!(self.basis_acl(), self.store.list_accounts())?;
        let associations = try_join_all(
            accounts
                .iter()
                .map(|account| self.store.account_associations(account)),
        )
        .await?;

        Ok(accounts
            .into_iter()
            .zip(associations)
            .map(|(account, associations)| {
                let mut users: Vec<UserStatus> = Vec::new();
                for association in associations {
                    match users.iter_mut().find(|u| u.user == association.user) {
                        // One row per partition; any blocked row blocks the user.
                        Some(existing) => existing.blocked |= association.is_blocked(),
                        None => users.push(UserStatus {
                            blocked: association.is_blocked(),
                            user: association.user,
                        }),
                    }
                }
                AccountWithUsers {
                    blocked: account_blocked(&acl, &account),
                    account,
                    users,
                }
            })
            .collect())
    }

    /// Associate a user with an account.
    #[instrument(skip(self))]
    pub async fn add_user_to_account(&self, user: &str, account: &str) -> AdapterResult<()> {
        validate_identifier("user", user)?;
        validate_identifier("account", account)?;
        self.require_account(account).await?;
        if self.store.association(user, account).await?.is_some() {
            return Err(AdapterError::AssociationExists {
                user: user.to_string(),
                account: account.to_string(),
            });
        }
        self.control.create_association(user, account).await
    }

    /// Remove a user's association with an account.
    #[instrument(skip(self))]
    pub async fn remove_user_from_account(&self, user: &str, account: &str) -> AdapterResult<()> {
        self.require_association(user, account).await?;
        self.control.delete_association(user, account).await
    }
}
