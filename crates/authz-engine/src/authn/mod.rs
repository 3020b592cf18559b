use std::time::Duration;

use schoolgate_core_types::{PrincipalId, Role};
use serde::{Deserialize, Serialize};

use crate::errors::AuthnError;

pub mod context;
pub mod hs256;

pub use context::{ContextResolver, RequestContext};
pub use hs256::{Audience, JwtCodec, TokenClaims};

pub const DEFAULT_ISSUER: &str = "schoolgate";
pub const DEFAULT_AUDIENCE: &str = "schoolgate-api";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Identity fields extracted from a token that passed every check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub id: PrincipalId,
    pub role: Role,
    pub username: String,
}

/// Verifies bearer tokens. Verification is synchronous and bounded: no I/O.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthnError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl: Duration,
}

impl JwtSettings {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }
}
