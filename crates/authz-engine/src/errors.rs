use schoolgate_core_types::ValidationError;
use schoolgate_registry::RegistryError;
use thiserror::Error;

/// Token verification failures. These never escape the context resolver;
/// they downgrade the request to anonymous.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthnError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token issuer mismatch")]
    IssuerMismatch,
    #[error("token audience mismatch")]
    AudienceMismatch,
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Failures reported by the account store collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

/// Problems with a gate map definition.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize gate map: {0}")]
    Deserialize(String),
    #[error("unsupported gate map version {0}")]
    UnsupportedVersion(u32),
    #[error("operation '{operation}' has an invalid rule: {reason}")]
    InvalidRule { operation: String, reason: String },
}

/// Errors surfaced by the authorization service surface.
///
/// `AccessDenied` is deliberately uniform: it never says which rule failed or
/// whether the target exists.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("access denied")]
    AccessDenied,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Reasons a rule evaluation can fail instead of producing a decision.
#[derive(Debug, Error)]
pub(crate) enum RuleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal rule failure: {0}")]
    Internal(String),
}
