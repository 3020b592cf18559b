use async_trait::async_trait;
use dashmap::DashMap;
use schoolgate_core_types::{PrincipalId, Role};
use serde::{Deserialize, Serialize};

use crate::errors::AccountError;

/// Result of an account lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub exists: bool,
    pub active: bool,
}

impl AccountStatus {
    pub const ACTIVE: AccountStatus = AccountStatus {
        exists: true,
        active: true,
    };
    pub const MISSING: AccountStatus = AccountStatus {
        exists: false,
        active: false,
    };

    pub fn is_usable(self) -> bool {
        self.exists && self.active
    }
}

/// Existence lookup for principals, backed by whatever owns the accounts.
///
/// Ids are scoped per role: admin 1 and teacher 1 are different accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn exists(&self, role: Role, id: PrincipalId) -> Result<AccountStatus, AccountError>;
}

/// Account table held in memory; used by the CLI and in tests.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<(Role, PrincipalId), bool>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, role: Role, id: PrincipalId, active: bool) {
        self.accounts.insert((role, id), active);
    }

    /// Returns false when the account does not exist.
    pub fn set_active(&self, role: Role, id: PrincipalId, active: bool) -> bool {
        match self.accounts.get_mut(&(role, id)) {
            Some(mut entry) => {
                *entry = active;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, role: Role, id: PrincipalId) -> bool {
        self.accounts.remove(&(role, id)).is_some()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn exists(&self, role: Role, id: PrincipalId) -> Result<AccountStatus, AccountError> {
        Ok(match self.accounts.get(&(role, id)) {
            Some(active) => AccountStatus {
                exists: true,
                active: *active,
            },
            None => AccountStatus::MISSING,
        })
    }
}

/// Treats every verified principal as an active account.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssumeActiveAccounts;

#[async_trait]
impl AccountStore for AssumeActiveAccounts {
    async fn exists(&self, _role: Role, _id: PrincipalId) -> Result<AccountStatus, AccountError> {
        Ok(AccountStatus::ACTIVE)
    }
}
