//! Service configuration.
//!
//! Read from YAML, with durations written as human strings (`5m`, `10d`) and
//! a handful of environment overrides for deployment secrets.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use authz_engine::authn::{DEFAULT_AUDIENCE, DEFAULT_ISSUER};
use authz_engine::{AccountStore, AuthzError, AuthzService, GateError, GateMap, JwtSettings};
use permission_cache::CacheConfig;
use schoolgate_audit::{AuditConfig, AuditError, JsonLinesSink};
use schoolgate_registry::{Registry, RegistryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const ENV_JWT_SECRET: &str = "SCHOOLGATE_JWT_SECRET";
pub const ENV_JWT_ISSUER: &str = "SCHOOLGATE_JWT_ISSUER";
pub const ENV_JWT_AUDIENCE: &str = "SCHOOLGATE_JWT_AUDIENCE";
pub const ENV_CACHE_TTL: &str = "SCHOOLGATE_CACHE_TTL";
pub const ENV_CACHE_MAX_ENTRIES: &str = "SCHOOLGATE_CACHE_MAX_ENTRIES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration { field: &'static str, value: String },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("signing secret is empty; set auth.secret or SCHOOLGATE_JWT_SECRET")]
    MissingSecret,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Authz(#[from] AuthzError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchoolgateConfig {
    pub log_level: String,
    pub auth: AuthSection,
    pub cache: CacheSection,
    pub audit: AuditSection,
    pub policy: PolicySection,
}

impl Default for SchoolgateConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            auth: AuthSection::default(),
            cache: CacheSection::default(),
            audit: AuditSection::default(),
            policy: PolicySection::default(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_lifetime: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            token_lifetime: "10d".to_string(),
        }
    }
}

// Keeps the secret out of debug logs.
impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("secret", &if self.secret.is_empty() { "" } else { "<redacted>" })
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_lifetime", &self.token_lifetime)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl: String,
    pub max_entries: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl: "5m".to_string(),
            max_entries: permission_cache::DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub max_entries: usize,
    pub retention: String,
    /// JSON-lines file receiving every audit entry.
    pub sink: Option<PathBuf>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            max_entries: schoolgate_audit::config::DEFAULT_MAX_ENTRIES,
            retention: "30d".to_string(),
            sink: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Registry table replacing the built-in one.
    pub registry: Option<PathBuf>,
    /// Gate map replacing the built-in one.
    pub gates: Option<PathBuf>,
}

impl SchoolgateConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Applies `SCHOOLGATE_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_JWT_SECRET) {
            self.auth.secret = secret;
        }
        if let Some(issuer) = lookup(ENV_JWT_ISSUER) {
            self.auth.issuer = issuer;
        }
        if let Some(audience) = lookup(ENV_JWT_AUDIENCE) {
            self.auth.audience = audience;
        }
        if let Some(ttl) = lookup(ENV_CACHE_TTL) {
            self.cache.ttl = ttl;
        }
        if let Some(raw) = lookup(ENV_CACHE_MAX_ENTRIES) {
            self.cache.max_entries = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "cache.max_entries",
                reason: format!("'{raw}' is not a positive integer"),
            })?;
        }
        Ok(())
    }

    pub fn jwt_settings(&self) -> Result<JwtSettings, ConfigError> {
        if self.auth.secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.auth.issuer.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "auth.issuer",
                reason: "must not be empty".into(),
            });
        }
        if self.auth.audience.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "auth.audience",
                reason: "must not be empty".into(),
            });
        }
        Ok(JwtSettings {
            secret: self.auth.secret.clone(),
            issuer: self.auth.issuer.clone(),
            audience: self.auth.audience.clone(),
            token_ttl: parse_duration("auth.token_lifetime", &self.auth.token_lifetime)?,
        })
    }

    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.max_entries",
                reason: "must be at least 1".into(),
            });
        }
        Ok(CacheConfig {
            ttl: parse_duration("cache.ttl", &self.cache.ttl)?,
            max_entries: self.cache.max_entries,
        })
    }

    pub fn audit_config(&self) -> Result<AuditConfig, ConfigError> {
        if self.audit.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "audit.max_entries",
                reason: "must be at least 1".into(),
            });
        }
        Ok(AuditConfig {
            max_entries: self.audit.max_entries,
            retention: parse_duration("audit.retention", &self.audit.retention)?,
        })
    }

    /// Builds the authorization service described by this configuration.
    /// `accounts` defaults to treating every verified principal as active.
    pub fn build_service(
        &self,
        accounts: Option<Arc<dyn AccountStore>>,
    ) -> Result<AuthzService, ConfigError> {
        let mut builder = AuthzService::builder(self.jwt_settings()?)
            .with_cache_config(self.cache_config()?)
            .with_audit_config(self.audit_config()?);

        if let Some(path) = &self.policy.registry {
            info!(path = %path.display(), "loading registry table");
            builder = builder.with_registry(Arc::new(Registry::load(path)?));
        }
        if let Some(path) = &self.policy.gates {
            info!(path = %path.display(), "loading gate map");
            builder = builder.with_gate_map(GateMap::load(path)?);
        }
        if let Some(path) = &self.audit.sink {
            builder = builder.with_audit_sink(Arc::new(JsonLinesSink::open(path)?));
        }
        match accounts {
            Some(accounts) => builder = builder.with_accounts(accounts),
            None => warn!("no account store configured; every verified principal is treated as active"),
        }

        Ok(builder.build()?)
    }
}

/// Config file path: explicit path, then `./config/schoolgate.yaml`, then
/// `<config dir>/schoolgate/config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("config/schoolgate.yaml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|mut path| {
        path.push("schoolgate");
        path.push("config.yaml");
        path
    })
}

fn parse_duration(field: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|_| ConfigError::InvalidDuration {
        field,
        value: raw.to_string(),
    })
}
