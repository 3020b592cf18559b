//! Permission checker: registry lookups, account validation and resource
//! ownership, memoized through the shared [`PermissionCache`].

use std::sync::Arc;

use parking_lot::RwLock;
use permission_cache::{CacheEntry, PermissionCache};
use schoolgate_audit::{AuditLevel, AuditLog};
use schoolgate_core_types::{Decision, Permission, ResourceId, Role};
use schoolgate_registry::RoleRegistry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::accounts::AccountStore;
use crate::principal::Principal;

/// Cache slot holding the result of the account lookup for a principal.
/// Never a valid permission name, so it cannot collide with a registry entry.
pub const ACCOUNT_STATUS_KEY: &str = "account:active";

pub const REASON_NO_USER: &str = "No user provided";
pub const REASON_UNKNOWN_PERMISSION: &str = "Unknown permission";
pub const REASON_INACTIVE: &str = "User not found or inactive";
pub const REASON_ACCOUNT_CHECK_FAILED: &str = "Account validation failed";
pub const REASON_GRANTED: &str = "Permission granted";
pub const REASON_DENIED: &str = "Permission denied";
pub const REASON_NOTHING_REQUESTED: &str = "No permissions requested";

/// Resource an action is aimed at, identified by id and the role whose
/// account table the id lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTarget {
    pub id: ResourceId,
    pub owner_role: Role,
}

impl ResourceTarget {
    pub fn new(id: ResourceId, owner_role: Role) -> Self {
        Self { id, owner_role }
    }
}

enum AccountCheck {
    Usable,
    Unusable { cached: bool },
    Failed(String),
}

pub struct PermissionChecker {
    registry: RwLock<Arc<dyn RoleRegistry>>,
    cache: Arc<PermissionCache>,
    accounts: Arc<dyn AccountStore>,
    audit: Arc<AuditLog>,
}

impl PermissionChecker {
    pub fn new(
        registry: Arc<dyn RoleRegistry>,
        cache: Arc<PermissionCache>,
        accounts: Arc<dyn AccountStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            cache,
            accounts,
            audit,
        }
    }

    /// Current registry snapshot.
    pub fn registry(&self) -> Arc<dyn RoleRegistry> {
        self.registry.read().clone()
    }

    /// Swaps the registry and drops every cached decision made against the
    /// previous one.
    pub fn replace_registry(&self, registry: Arc<dyn RoleRegistry>) {
        *self.registry.write() = registry;
        self.cache.invalidate_all();
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Decides whether `principal` holds `permission`.
    ///
    /// Every call appends exactly one authorization entry to the audit log.
    pub async fn check_permission(
        &self,
        principal: Option<&Principal>,
        permission: &Permission,
    ) -> Decision {
        let Some(principal) = principal else {
            let decision = Decision::deny(REASON_NO_USER);
            self.audit_permission(None, permission, &decision, AuditLevel::Warning, json!({}));
            return decision;
        };

        // Read before the registry snapshot: a reload swaps the registry and
        // then invalidates, so any decision from an older snapshot carries an
        // older generation and is not written back.
        let generation = self.cache.generation();
        let registry = self.registry();
        if permission.as_str() == ACCOUNT_STATUS_KEY || !registry.is_known_permission(permission) {
            warn!(
                principal_id = principal.id().0,
                permission = permission.as_str(),
                "unknown permission requested"
            );
            let decision = Decision::deny(REASON_UNKNOWN_PERMISSION);
            self.audit_permission(
                Some(principal),
                permission,
                &decision,
                AuditLevel::Security,
                json!({ "cached": false }),
            );
            return decision;
        }

        match self.check_account(principal, generation).await {
            AccountCheck::Usable => {}
            AccountCheck::Unusable { cached } => {
                let decision = Decision::deny(REASON_INACTIVE);
                self.audit_permission(
                    Some(principal),
                    permission,
                    &decision,
                    AuditLevel::Warning,
                    json!({ "cached": cached }),
                );
                return decision;
            }
            AccountCheck::Failed(error) => {
                let decision = Decision::deny(REASON_ACCOUNT_CHECK_FAILED);
                self.audit_permission(
                    Some(principal),
                    permission,
                    &decision,
                    AuditLevel::Security,
                    json!({ "cached": false, "error": error }),
                );
                return decision;
            }
        }

        if let Some(entry) = self
            .cache
            .get(principal.id(), permission)
            .filter(|entry| entry.applies_to(principal.role()))
        {
            debug!(
                principal_id = principal.id().0,
                permission = permission.as_str(),
                "permission cache hit"
            );
            let decision = entry.decision();
            self.audit_permission(
                Some(principal),
                permission,
                &decision,
                level_for(&decision),
                json!({ "cached": true }),
            );
            return decision;
        }

        debug!(
            principal_id = principal.id().0,
            permission = permission.as_str(),
            "permission cache miss"
        );
        let decision = if registry.has_permission(principal.role(), permission) {
            Decision::allow(REASON_GRANTED)
        } else {
            Decision::deny(REASON_DENIED)
        };
        self.cache.set_if_generation(
            generation,
            principal.id(),
            permission,
            CacheEntry::from_decision(&decision).for_role(principal.role()),
        );
        self.audit_permission(
            Some(principal),
            permission,
            &decision,
            level_for(&decision),
            json!({ "cached": false }),
        );
        decision
    }

    /// Ownership rule: root reaches everything, anyone reaches their own
    /// account, otherwise the caller's role must strictly outrank the owner's.
    pub fn check_resource_access(
        &self,
        principal: Option<&Principal>,
        resource: ResourceId,
        owner_role: Role,
    ) -> Decision {
        let decision = match principal {
            None => Decision::deny(REASON_NO_USER),
            Some(principal) if principal.role() == Role::Root => Decision::allow("Root access"),
            Some(principal)
                if principal.role() == owner_role && resource.matches(principal.id()) =>
            {
                Decision::allow("Self access")
            }
            Some(principal) if self.registry().is_higher_role(principal.role(), owner_role) => {
                Decision::allow("Higher role access")
            }
            Some(_) => Decision::deny("Insufficient role for resource"),
        };

        self.audit.authorization(
            principal.map(Principal::actor),
            "resource_access",
            owner_role.as_str(),
            Some(resource.to_string()),
            decision.allowed,
            json!({ "reason": decision.reason }),
        );
        decision
    }

    /// Permission check followed, when a target is given, by the ownership
    /// check. Both must allow; the first denial is returned.
    pub async fn check_action_permission(
        &self,
        principal: Option<&Principal>,
        permission: &Permission,
        target: Option<ResourceTarget>,
    ) -> Decision {
        let decision = self.check_permission(principal, permission).await;
        if !decision.allowed {
            return decision;
        }
        match target {
            Some(target) => self.check_resource_access(principal, target.id, target.owner_role),
            None => decision,
        }
    }

    /// Allows on the first granted permission.
    pub async fn check_any_permission(
        &self,
        principal: Option<&Principal>,
        permissions: &[Permission],
    ) -> Decision {
        let mut last = Decision::deny(REASON_NOTHING_REQUESTED);
        for permission in permissions {
            let decision = self.check_permission(principal, permission).await;
            if decision.allowed {
                return decision;
            }
            last = decision;
        }
        last
    }

    /// Denies on the first missing permission. An empty list denies.
    pub async fn check_all_permissions(
        &self,
        principal: Option<&Principal>,
        permissions: &[Permission],
    ) -> Decision {
        let mut last = Decision::deny(REASON_NOTHING_REQUESTED);
        for permission in permissions {
            let decision = self.check_permission(principal, permission).await;
            if !decision.allowed {
                return decision;
            }
            last = decision;
        }
        last
    }

    async fn check_account(&self, principal: &Principal, generation: u64) -> AccountCheck {
        let key = Permission::new(ACCOUNT_STATUS_KEY);
        if let Some(entry) = self
            .cache
            .get(principal.id(), &key)
            .filter(|entry| entry.applies_to(principal.role()))
        {
            return if entry.allowed {
                AccountCheck::Usable
            } else {
                AccountCheck::Unusable { cached: true }
            };
        }

        match self.accounts.exists(principal.role(), principal.id()).await {
            Ok(status) => {
                let decision = if status.is_usable() {
                    Decision::allow("Account active")
                } else {
                    Decision::deny(REASON_INACTIVE)
                };
                self.cache.set_if_generation(
                    generation,
                    principal.id(),
                    &key,
                    CacheEntry::from_decision(&decision).for_role(principal.role()),
                );
                if decision.allowed {
                    AccountCheck::Usable
                } else {
                    AccountCheck::Unusable { cached: false }
                }
            }
            Err(err) => {
                warn!(principal_id = principal.id().0, error = %err, "account lookup failed");
                AccountCheck::Failed(err.to_string())
            }
        }
    }

    fn audit_permission(
        &self,
        principal: Option<&Principal>,
        permission: &Permission,
        decision: &Decision,
        level: AuditLevel,
        mut details: serde_json::Value,
    ) {
        if let Some(map) = details.as_object_mut() {
            map.insert("reason".into(), json!(decision.reason));
        }
        self.audit.authorization_at(
            level,
            principal.map(Principal::actor),
            permission.as_str(),
            "permission",
            None,
            decision.allowed,
            details,
        );
    }
}

fn level_for(decision: &Decision) -> AuditLevel {
    if decision.allowed {
        AuditLevel::Info
    } else {
        AuditLevel::Warning
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use permission_cache::CacheConfig;
    use schoolgate_audit::{AuditCategory, AuditFilter};
    use schoolgate_core_types::PrincipalId;
    use schoolgate_registry::Registry;

    use super::*;
    use crate::accounts::{AccountStatus, AssumeActiveAccounts, InMemoryAccountStore};
    use crate::errors::AccountError;

    struct CountingRegistry {
        inner: Registry,
        lookups: AtomicUsize,
    }

    impl CountingRegistry {
        fn new() -> Self {
            Self {
                inner: Registry::builtin(),
                lookups: AtomicUsize::new(0),
            }
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    impl RoleRegistry for CountingRegistry {
        fn has_permission(&self, role: Role, permission: &Permission) -> bool {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.has_permission(role, permission)
        }

        fn is_known_permission(&self, permission: &Permission) -> bool {
            self.inner.is_known_permission(permission)
        }
    }

    struct CountingAccounts {
        inner: InMemoryAccountStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl AccountStore for CountingAccounts {
        async fn exists(&self, role: Role, id: PrincipalId) -> Result<AccountStatus, AccountError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.exists(role, id).await
        }
    }

    struct BrokenAccounts;

    #[async_trait]
    impl AccountStore for BrokenAccounts {
        async fn exists(&self, _: Role, _: PrincipalId) -> Result<AccountStatus, AccountError> {
            Err(AccountError::Unavailable("connection refused".into()))
        }
    }

    /// Parks the first lookup until released; later lookups pass straight
    /// through.
    #[derive(Default)]
    struct GatedAccounts {
        entered: Notify,
        release: Notify,
        open: AtomicBool,
    }

    #[async_trait]
    impl AccountStore for GatedAccounts {
        async fn exists(&self, _: Role, _: PrincipalId) -> Result<AccountStatus, AccountError> {
            if !self.open.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(AccountStatus::ACTIVE)
        }
    }

    struct RootOnlyRegistry;

    impl RoleRegistry for RootOnlyRegistry {
        fn has_permission(&self, role: Role, _: &Permission) -> bool {
            role == Role::Root
        }

        fn is_known_permission(&self, permission: &Permission) -> bool {
            Registry::builtin().is_known_permission(permission)
        }
    }

    fn checker_with(
        registry: Arc<dyn RoleRegistry>,
        accounts: Arc<dyn AccountStore>,
    ) -> PermissionChecker {
        checker_with_cache(registry, accounts, CacheConfig::default())
    }

    fn checker_with_cache(
        registry: Arc<dyn RoleRegistry>,
        accounts: Arc<dyn AccountStore>,
        cache: CacheConfig,
    ) -> PermissionChecker {
        PermissionChecker::new(
            registry,
            Arc::new(PermissionCache::new(cache)),
            accounts,
            Arc::new(AuditLog::default()),
        )
    }

    fn checker() -> PermissionChecker {
        checker_with(Arc::new(Registry::builtin()), Arc::new(AssumeActiveAccounts))
    }

    fn admin(id: i64) -> Principal {
        Principal::for_tests(id, Role::Admin, "admin")
    }

    #[tokio::test]
    async fn admin_view_admins_is_granted_and_cached() {
        let checker = checker();
        let principal = admin(1);
        let permission = Permission::from("view_admins");

        let decision = checker.check_permission(Some(&principal), &permission).await;
        assert_eq!(decision, Decision::allow("Permission granted"));

        let cached = checker.cache().get(PrincipalId(1), &permission).unwrap();
        assert!(cached.allowed);
        assert_eq!(cached.reason, "Permission granted");
    }

    #[tokio::test]
    async fn missing_principal_is_denied_without_caching() {
        let checker = checker();
        let decision = checker
            .check_permission(None, &Permission::from("view_teachers"))
            .await;
        assert_eq!(decision, Decision::deny("No user provided"));
        assert!(checker.cache().is_empty());
        assert_eq!(checker.audit().len(), 1);
    }

    #[tokio::test]
    async fn repeated_checks_hit_registry_once() {
        let registry = Arc::new(CountingRegistry::new());
        let checker = checker_with(registry.clone(), Arc::new(AssumeActiveAccounts));
        let principal = Principal::for_tests(4, Role::Teacher, "tina");

        for name in ["view_teachers", "view_admins"] {
            let permission = Permission::from(name);
            let first = checker.check_permission(Some(&principal), &permission).await;
            let second = checker.check_permission(Some(&principal), &permission).await;
            assert_eq!(first, second);
        }
        assert_eq!(registry.lookups(), 2);

        checker.cache().invalidate_user(PrincipalId(4));
        checker
            .check_permission(Some(&principal), &Permission::from("view_teachers"))
            .await;
        assert_eq!(registry.lookups(), 3);
    }

    #[tokio::test]
    async fn every_check_appends_one_matching_audit_entry() {
        let checker = checker();
        let teacher = Principal::for_tests(2, Role::Teacher, "t");
        let cases = [
            (Some(&teacher), "view_teachers"),
            (Some(&teacher), "view_teachers"),
            (Some(&teacher), "delete_admin"),
            (Some(&teacher), "no_such_permission"),
            (None, "view_teachers"),
        ];

        for (count, (principal, name)) in cases.into_iter().enumerate() {
            let decision = checker.check_permission(principal, &Permission::from(name)).await;
            assert_eq!(checker.audit().len(), count + 1);
            let entry = &checker.audit().recent(1)[0];
            assert_eq!(entry.category, AuditCategory::Authorization);
            assert_eq!(entry.action, name);
            assert_eq!(entry.success, decision.allowed);
        }
    }

    #[tokio::test]
    async fn unknown_permission_is_a_security_event() {
        let checker = checker();
        let decision = checker
            .check_permission(Some(&admin(1)), &Permission::from("launch_rockets"))
            .await;
        assert_eq!(decision, Decision::deny("Unknown permission"));
        assert!(checker.cache().is_empty());

        let security = checker.audit().query(&AuditFilter {
            level: Some(AuditLevel::Security),
            ..AuditFilter::default()
        });
        assert_eq!(security.len(), 1);
    }

    #[tokio::test]
    async fn reserved_account_key_is_not_a_permission() {
        let checker = checker();
        let decision = checker
            .check_permission(Some(&admin(1)), &Permission::from(ACCOUNT_STATUS_KEY))
            .await;
        assert_eq!(decision.reason, REASON_UNKNOWN_PERMISSION);
    }

    #[tokio::test]
    async fn inactive_accounts_are_denied_until_invalidated() {
        let store = Arc::new(InMemoryAccountStore::new());
        store.insert(Role::Admin, PrincipalId(3), false);
        let checker = checker_with(Arc::new(Registry::builtin()), store.clone());
        let principal = admin(3);
        let permission = Permission::from("view_admins");

        let decision = checker.check_permission(Some(&principal), &permission).await;
        assert_eq!(decision, Decision::deny("User not found or inactive"));

        store.set_active(Role::Admin, PrincipalId(3), true);
        let still_cached = checker.check_permission(Some(&principal), &permission).await;
        assert!(!still_cached.allowed);

        checker.cache().invalidate_user(PrincipalId(3));
        let decision = checker.check_permission(Some(&principal), &permission).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn account_status_is_cached_per_principal() {
        let inner = InMemoryAccountStore::new();
        inner.insert(Role::Admin, PrincipalId(1), true);
        let accounts = Arc::new(CountingAccounts {
            inner,
            lookups: AtomicUsize::new(0),
        });
        let checker = checker_with(Arc::new(Registry::builtin()), accounts.clone());

        for name in ["view_admins", "view_teachers", "create_teacher"] {
            checker
                .check_permission(Some(&admin(1)), &Permission::from(name))
                .await;
        }
        assert_eq!(accounts.lookups.load(Ordering::SeqCst), 1);
        assert!(checker
            .cache()
            .get(PrincipalId(1), &Permission::from(ACCOUNT_STATUS_KEY))
            .is_some());
    }

    #[tokio::test]
    async fn same_id_in_another_role_does_not_share_decisions() {
        let checker = checker();
        let permission = Permission::from("view_admins");
        let admin_one = admin(1);
        let teacher_one = Principal::for_tests(1, Role::Teacher, "t1");

        assert!(checker.check_permission(Some(&admin_one), &permission).await.allowed);
        assert!(!checker.check_permission(Some(&teacher_one), &permission).await.allowed);
    }

    #[tokio::test]
    async fn account_store_failure_denies_without_caching() {
        let checker = checker_with(Arc::new(Registry::builtin()), Arc::new(BrokenAccounts));
        let decision = checker
            .check_permission(Some(&admin(1)), &Permission::from("view_admins"))
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, REASON_ACCOUNT_CHECK_FAILED);
        assert!(checker.cache().is_empty());
        assert_eq!(checker.audit().recent(1)[0].level, AuditLevel::Security);
    }

    #[test]
    fn resource_access_follows_strict_hierarchy() {
        let checker = checker();
        let root = Principal::for_tests(1, Role::Root, "root");
        let admin5 = admin(5);
        let teacher = Principal::for_tests(5, Role::Teacher, "t5");

        for owner in Role::ALL {
            assert!(checker.check_resource_access(Some(&root), ResourceId(42), owner).allowed);
        }
        assert!(checker.check_resource_access(Some(&admin5), ResourceId(5), Role::Admin).allowed);
        assert!(!checker.check_resource_access(Some(&admin5), ResourceId(6), Role::Admin).allowed);
        assert!(checker.check_resource_access(Some(&admin5), ResourceId(9), Role::Teacher).allowed);
        assert!(!checker.check_resource_access(Some(&admin5), ResourceId(1), Role::Root).allowed);
        assert!(!checker.check_resource_access(Some(&teacher), ResourceId(6), Role::Teacher).allowed);
        assert!(!checker.check_resource_access(None, ResourceId(5), Role::Teacher).allowed);
    }

    #[test]
    fn self_access_requires_matching_role() {
        let checker = checker();
        let teacher = Principal::for_tests(5, Role::Teacher, "t5");
        let decision = checker.check_resource_access(Some(&teacher), ResourceId(5), Role::Admin);
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn action_permission_requires_both_checks() {
        let checker = checker();
        let admin5 = admin(5);
        let update_admin = Permission::from("update_admin");

        let own = checker
            .check_action_permission(
                Some(&admin5),
                &update_admin,
                Some(ResourceTarget::new(ResourceId(5), Role::Admin)),
            )
            .await;
        assert!(own.allowed);

        let peer = checker
            .check_action_permission(
                Some(&admin5),
                &update_admin,
                Some(ResourceTarget::new(ResourceId(6), Role::Admin)),
            )
            .await;
        assert!(!peer.allowed);

        let teacher = Principal::for_tests(5, Role::Teacher, "t5");
        let audit_before = checker.audit().len();
        let denied = checker
            .check_action_permission(
                Some(&teacher),
                &update_admin,
                Some(ResourceTarget::new(ResourceId(5), Role::Teacher)),
            )
            .await;
        assert_eq!(denied, Decision::deny("Permission denied"));
        // ownership was never evaluated
        assert_eq!(checker.audit().len(), audit_before + 1);
    }

    #[tokio::test]
    async fn any_and_all_combinators() {
        let checker = checker();
        let teacher = Principal::for_tests(8, Role::Teacher, "t8");
        let mixed = [Permission::from("view_admins"), Permission::from("view_teachers")];

        assert!(checker.check_any_permission(Some(&teacher), &mixed).await.allowed);
        assert!(!checker.check_all_permissions(Some(&teacher), &mixed).await.allowed);
        assert!(!checker.check_any_permission(Some(&teacher), &[]).await.allowed);
        assert!(!checker.check_all_permissions(Some(&teacher), &[]).await.allowed);
    }

    #[tokio::test]
    async fn replacing_registry_flushes_cache() {
        let checker = checker();
        let principal = admin(1);
        checker
            .check_permission(Some(&principal), &Permission::from("view_admins"))
            .await;
        assert!(!checker.cache().is_empty());

        checker.replace_registry(Arc::new(Registry::builtin()));
        assert!(checker.cache().is_empty());
    }

    #[tokio::test]
    async fn evicted_decision_is_recomputed() {
        let registry = Arc::new(CountingRegistry::new());
        let checker = checker_with_cache(
            registry.clone(),
            Arc::new(AssumeActiveAccounts),
            CacheConfig {
                ttl: permission_cache::DEFAULT_TTL,
                max_entries: 3,
            },
        );
        let principal = admin(1);
        let view_admins = Permission::from("view_admins");

        let first = checker.check_permission(Some(&principal), &view_admins).await;
        for name in ["view_teachers", "view_students", "view_classes"] {
            checker
                .check_permission(Some(&principal), &Permission::from(name))
                .await;
        }
        assert_eq!(registry.lookups(), 4);
        assert!(checker.cache().get(PrincipalId(1), &view_admins).is_none());

        let again = checker.check_permission(Some(&principal), &view_admins).await;
        assert_eq!(again, first);
        assert_eq!(registry.lookups(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reload_during_account_lookup_discards_stale_grant() {
        let accounts = Arc::new(GatedAccounts::default());
        let checker = Arc::new(checker_with(
            Arc::new(Registry::builtin()),
            accounts.clone(),
        ));
        let view_admins = Permission::from("view_admins");

        let in_flight = tokio::spawn({
            let checker = checker.clone();
            let view_admins = view_admins.clone();
            async move {
                checker
                    .check_permission(Some(&admin(1)), &view_admins)
                    .await
            }
        });
        accounts.entered.notified().await;
        checker.replace_registry(Arc::new(RootOnlyRegistry));
        accounts.release.notify_one();

        // computed against the old table, but never cached
        assert!(in_flight.await.unwrap().allowed);
        assert!(checker.cache().get(PrincipalId(1), &view_admins).is_none());
        assert!(checker
            .cache()
            .get(PrincipalId(1), &Permission::from(ACCOUNT_STATUS_KEY))
            .is_none());

        let after = checker.check_permission(Some(&admin(1)), &view_admins).await;
        assert_eq!(after, Decision::deny(REASON_DENIED));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deactivation_during_account_lookup_is_not_overwritten() {
        let accounts = Arc::new(GatedAccounts::default());
        let checker = Arc::new(checker_with(
            Arc::new(Registry::builtin()),
            accounts.clone(),
        ));

        let in_flight = tokio::spawn({
            let checker = checker.clone();
            async move {
                checker
                    .check_permission(Some(&admin(7)), &Permission::from("view_teachers"))
                    .await
            }
        });
        accounts.entered.notified().await;
        checker.cache().invalidate_user(PrincipalId(7));
        accounts.release.notify_one();
        in_flight.await.unwrap();

        assert!(checker.cache().is_empty());
    }
}
