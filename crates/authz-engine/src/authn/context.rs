use std::sync::Arc;

use schoolgate_audit::AuditLog;
use serde_json::json;
use tracing::debug;

use super::TokenVerifier;
use crate::principal::Principal;

/// Per-request authentication state handed to the gate layer.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

/// Turns an `Authorization` header value into a [`RequestContext`].
///
/// Verification failures are soft: the request continues anonymously and the
/// gate decides later whether anonymous access is acceptable.
pub struct ContextResolver {
    verifier: Arc<dyn TokenVerifier>,
    audit: Arc<AuditLog>,
}

impl ContextResolver {
    pub fn new(verifier: Arc<dyn TokenVerifier>, audit: Arc<AuditLog>) -> Self {
        Self { verifier, audit }
    }

    pub fn resolve(&self, authorization: Option<&str>) -> RequestContext {
        let Some(token) = authorization.and_then(extract_token) else {
            return RequestContext::anonymous();
        };

        match self.verifier.verify(token) {
            Ok(claims) => {
                let principal = Principal::from_verified(claims);
                self.audit.authentication(
                    Some(principal.actor()),
                    "token_verified",
                    true,
                    json!({ "username": principal.username() }),
                );
                RequestContext {
                    principal: Some(principal),
                }
            }
            Err(err) => {
                debug!(error = %err, "bearer token rejected; continuing anonymously");
                self.audit.authentication(
                    None,
                    "token_rejected",
                    false,
                    json!({ "error": err.to_string() }),
                );
                RequestContext::anonymous()
            }
        }
    }
}

fn extract_token(header: &str) -> Option<&str> {
    let trimmed = header.trim_start();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed)
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
