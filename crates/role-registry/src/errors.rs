use schoolgate_core_types::{Role, ValidationError};
use thiserror::Error;

/// Errors surfaced while loading or validating a registry table.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize registry: {0}")]
    Deserialize(String),
    #[error("role '{0}' is missing from the registry table")]
    MissingRole(Role),
    #[error("role inheritance cycle through '{0}'")]
    InheritanceCycle(Role),
    #[error("unsupported registry version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
