//! schoolgate library
//!
//! Configuration for the authorization service and re-exports of the engine
//! crates, so integrators depend on one package.

pub mod config;

pub use authz_engine::{
    AccountStore, AuthzError, AuthzService, AuthzServiceBuilder, Decision, GateMap,
    InMemoryAccountStore, JwtCodec, JwtSettings, Permission, Principal, PrincipalId,
    RequestContext, ResourceId, Role, Rule,
};
pub use config::{resolve_config_path, ConfigError, SchoolgateConfig};
pub use permission_cache::{CacheConfig, CacheStats};
pub use schoolgate_audit::{AuditCategory, AuditEntry, AuditFilter, AuditLevel, AuditLog};
pub use schoolgate_registry::{Registry, RoleRegistry};
