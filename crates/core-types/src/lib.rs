//! Shared primitives for the schoolgate authorization crates.
//!
//! Everything here is plain data: roles and their hierarchy rank, permission
//! tokens, typed identifiers and the allow/deny [`Decision`] passed between the
//! checker, the cache and the gate layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input rejected before it reaches any authorization comparison.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("missing argument: {0}")]
    MissingArgument(String),
    #[error("invalid resource id in '{arg}': {reason}")]
    InvalidResourceId { arg: String, reason: String },
    #[error("permission name must not be empty")]
    EmptyPermission,
}

/// Actor kinds known to the system. Immutable at runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Admin,
    Teacher,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Root, Role::Admin, Role::Teacher];

    /// Hierarchy rank; a larger value outranks a smaller one.
    pub fn rank(self) -> u8 {
        match self {
            Role::Root => 3,
            Role::Admin => 2,
            Role::Teacher => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Admin => "admin",
            Role::Teacher => "teacher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "root" => Ok(Role::Root),
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// Named capability token checked against a role's permission set.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Account identifier carried by a verified token.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub i64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed identifier of the resource an operation targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub i64);

impl ResourceId {
    /// Reads an identifier out of an operation argument.
    ///
    /// Integers and canonical decimal strings (GraphQL `ID` values) are
    /// accepted. Anything else, including floats, negative numbers and
    /// padded or signed strings, is rejected instead of coerced.
    pub fn from_arg(arg: &str, value: &serde_json::Value) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidResourceId {
            arg: arg.to_string(),
            reason: reason.to_string(),
        };
        match value {
            serde_json::Value::Number(number) => {
                let id = number.as_i64().ok_or_else(|| invalid("not an integer"))?;
                if id < 0 {
                    return Err(invalid("negative identifier"));
                }
                Ok(ResourceId(id))
            }
            serde_json::Value::String(raw) => raw.parse().map_err(|err| match err {
                ValidationError::InvalidResourceId { reason, .. } => invalid(&reason),
                other => other,
            }),
            serde_json::Value::Null => Err(ValidationError::MissingArgument(arg.to_string())),
            _ => Err(invalid("expected an integer identifier")),
        }
    }

    pub fn matches(self, principal: PrincipalId) -> bool {
        self.0 == principal.0
    }
}

impl FromStr for ResourceId {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidResourceId {
            arg: String::new(),
            reason: reason.to_string(),
        };
        if raw.is_empty() {
            return Err(invalid("empty identifier"));
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal integer"));
        }
        if raw.len() > 1 && raw.starts_with('0') {
            return Err(invalid("leading zeros"));
        }
        raw.parse::<i64>()
            .map(ResourceId)
            .map_err(|_| invalid("out of range"))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of an authorization check.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}
