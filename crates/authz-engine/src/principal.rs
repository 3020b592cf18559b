use schoolgate_audit::Actor;
use schoolgate_core_types::{PrincipalId, Role};
use serde::Serialize;

use crate::authn::VerifiedClaims;

/// Authenticated identity of a single request.
///
/// Only the context resolver creates principals, and only from a token that
/// passed verification. They are never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: PrincipalId,
    role: Role,
    username: String,
}

impl Principal {
    pub(crate) fn from_verified(claims: VerifiedClaims) -> Self {
        Self {
            id: claims.id,
            role: claims.role,
            username: claims.username,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: i64, role: Role, username: &str) -> Self {
        Self {
            id: PrincipalId(id),
            role,
            username: username.to_string(),
        }
    }

    pub fn id(&self) -> PrincipalId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}
