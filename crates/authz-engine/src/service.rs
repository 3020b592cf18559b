use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use permission_cache::{CacheConfig, CacheStats, PermissionCache};
use schoolgate_audit::{AuditConfig, AuditLog, AuditSink};
use schoolgate_core_types::{Decision, PrincipalId};
use schoolgate_registry::{Registry, RoleRegistry};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::accounts::{AccountStore, AssumeActiveAccounts};
use crate::authn::{ContextResolver, JwtCodec, JwtSettings, RequestContext};
use crate::checker::PermissionChecker;
use crate::errors::AuthzError;
use crate::gate::{GateMap, Gatekeeper};
use crate::principal::Principal;

/// Outcome of one maintenance pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub expired_decisions: usize,
    pub pruned_audit_entries: usize,
}

pub struct AuthzServiceBuilder {
    settings: JwtSettings,
    cache: CacheConfig,
    audit: AuditConfig,
    registry: Option<Arc<dyn RoleRegistry>>,
    gate_map: Option<GateMap>,
    accounts: Option<Arc<dyn AccountStore>>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuthzServiceBuilder {
    pub fn new(settings: JwtSettings) -> Self {
        Self {
            settings,
            cache: CacheConfig::default(),
            audit: AuditConfig::default(),
            registry: None,
            gate_map: None,
            accounts: None,
            sinks: Vec::new(),
        }
    }

    pub fn with_cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_audit_config(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn RoleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_gate_map(mut self, gate_map: GateMap) -> Self {
        self.gate_map = Some(gate_map);
        self
    }

    pub fn with_accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<AuthzService, AuthzError> {
        let codec = Arc::new(
            JwtCodec::new(self.settings).map_err(|err| AuthzError::Config(err.to_string()))?,
        );
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(Registry::builtin()));
        let gate_map = Arc::new(self.gate_map.unwrap_or_default());
        let accounts = self
            .accounts
            .unwrap_or_else(|| Arc::new(AssumeActiveAccounts));

        for (operation, permission) in gate_map.unknown_permissions(registry.as_ref()) {
            warn!(
                operation = operation.as_str(),
                permission = permission.as_str(),
                "gate rule names a permission the registry does not define; it will always deny"
            );
        }

        let audit = Arc::new(AuditLog::new(self.audit));
        for sink in self.sinks {
            audit.add_sink(sink);
        }
        let cache = Arc::new(PermissionCache::new(self.cache));
        let checker = Arc::new(PermissionChecker::new(
            registry,
            cache.clone(),
            accounts,
            audit.clone(),
        ));

        info!(
            cache_ttl = %humantime::format_duration(cache.config().ttl),
            cache_max_entries = cache.config().max_entries,
            operations = gate_map.len(),
            issuer = codec.settings().issuer.as_str(),
            "authorization service ready"
        );

        Ok(AuthzService {
            resolver: ContextResolver::new(codec.clone(), audit.clone()),
            gate: Gatekeeper::new(gate_map, checker.clone()),
            codec,
            checker,
            cache,
            audit,
        })
    }
}

/// Process-wide authorization service. Built once at startup and shared
/// behind an `Arc`.
pub struct AuthzService {
    codec: Arc<JwtCodec>,
    resolver: ContextResolver,
    checker: Arc<PermissionChecker>,
    gate: Gatekeeper,
    cache: Arc<PermissionCache>,
    audit: Arc<AuditLog>,
}

impl AuthzService {
    pub fn builder(settings: JwtSettings) -> AuthzServiceBuilder {
        AuthzServiceBuilder::new(settings)
    }

    pub fn resolve_context(&self, authorization: Option<&str>) -> RequestContext {
        self.resolver.resolve(authorization)
    }

    pub async fn evaluate(
        &self,
        operation: &str,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Decision {
        self.gate.evaluate(operation, args, principal).await
    }

    pub async fn guard(
        &self,
        operation: &str,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Result<(), AuthzError> {
        self.gate.guard(operation, args, principal).await
    }

    pub async fn dispatch<F, Fut, T>(
        &self,
        operation: &str,
        args: &Value,
        principal: Option<&Principal>,
        resolver: F,
    ) -> Result<T, AuthzError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.gate.dispatch(operation, args, principal, resolver).await
    }

    pub fn checker(&self) -> &Arc<PermissionChecker> {
        &self.checker
    }

    pub fn gatekeeper(&self) -> &Gatekeeper {
        &self.gate
    }

    pub fn gate_map(&self) -> &GateMap {
        self.gate.map()
    }

    /// Token issuer/verifier configured for this service.
    pub fn codec(&self) -> &Arc<JwtCodec> {
        &self.codec
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Drops every cached decision for `id`, including its account status.
    pub fn invalidate_user(&self, id: PrincipalId) -> usize {
        let removed = self.cache.invalidate_user(id);
        info!(principal_id = id.0, removed, "invalidated cached decisions");
        self.audit.system_event(
            "cache_invalidate_user",
            json!({ "principal_id": id.0, "removed": removed }),
        );
        removed
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        info!("invalidated all cached decisions");
        self.audit.system_event("cache_invalidate_all", json!({}));
    }

    /// Swaps in a new registry and flushes the cache.
    pub fn reload_registry(&self, registry: Arc<dyn RoleRegistry>) {
        for (operation, permission) in self.gate_map().unknown_permissions(registry.as_ref()) {
            warn!(
                operation = operation.as_str(),
                permission = permission.as_str(),
                "reloaded registry no longer defines a gated permission"
            );
        }
        self.checker.replace_registry(registry);
        info!("registry reloaded");
        self.audit.system_event("registry_reloaded", json!({}));
    }

    pub fn reload_registry_from_path(&self, path: impl AsRef<Path>) -> Result<(), AuthzError> {
        let registry = Registry::load(path.as_ref())?;
        self.reload_registry(Arc::new(registry));
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Purges expired cache entries and audit entries past retention.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        MaintenanceReport {
            expired_decisions: self.cache.purge_expired(),
            pruned_audit_entries: self.audit.prune_expired(),
        }
    }

    /// Runs [`run_maintenance`](Self::run_maintenance) on a fixed period until
    /// the handle is aborted. Must be called inside a Tokio runtime.
    pub fn spawn_maintenance(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = service.run_maintenance();
                if report != MaintenanceReport::default() {
                    info!(
                        expired_decisions = report.expired_decisions,
                        pruned_audit_entries = report.pruned_audit_entries,
                        "authorization maintenance pass"
                    );
                }
            }
        })
    }
}
