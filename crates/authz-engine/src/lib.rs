//! Authorization engine: token context resolution, the permission checker and
//! the operation gate, wired together by [`AuthzService`].

pub mod accounts;
pub mod authn;
pub mod checker;
pub mod errors;
pub mod gate;
pub mod principal;
pub mod service;

pub use accounts::{AccountStatus, AccountStore, AssumeActiveAccounts, InMemoryAccountStore};
pub use authn::{
    ContextResolver, JwtCodec, JwtSettings, RequestContext, TokenClaims, TokenVerifier,
    VerifiedClaims,
};
pub use checker::{PermissionChecker, ResourceTarget, ACCOUNT_STATUS_KEY};
pub use errors::{AccountError, AuthnError, AuthzError, GateError};
pub use gate::{CompositeMode, GateMap, GateMapFile, Gatekeeper, Rule};
pub use principal::Principal;
pub use service::{AuthzService, AuthzServiceBuilder, MaintenanceReport};

pub use permission_cache::{CacheConfig, CacheStats};
pub use schoolgate_core_types::{Decision, Permission, PrincipalId, ResourceId, Role};
