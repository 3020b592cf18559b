use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use authz_engine::{AccountStore, AuthzService, GateMap, JwtCodec};
use schoolgate::config::SchoolgateConfig;
use schoolgate_registry::Registry;

use super::runtime::describe_source;

pub struct CliContext {
    config: SchoolgateConfig,
}

impl CliContext {
    pub fn new(config: SchoolgateConfig, config_path: Option<PathBuf>) -> Self {
        describe_source(config_path.as_deref());
        Self { config }
    }

    pub fn codec(&self) -> Result<JwtCodec> {
        let settings = self.config.jwt_settings()?;
        JwtCodec::new(settings).context("Failed to initialise token codec")
    }

    pub fn registry(&self) -> Result<Registry> {
        match &self.config.policy.registry {
            Some(path) => Registry::load(path)
                .with_context(|| format!("Failed to load registry {}", path.display())),
            None => Ok(Registry::builtin()),
        }
    }

    pub fn gate_map(&self) -> Result<GateMap> {
        match &self.config.policy.gates {
            Some(path) => GateMap::load(path)
                .with_context(|| format!("Failed to load gate map {}", path.display())),
            None => Ok(GateMap::builtin()),
        }
    }

    pub fn service(&self, accounts: Option<Arc<dyn AccountStore>>) -> Result<AuthzService> {
        self.config
            .build_service(accounts)
            .context("Failed to build authorization service")
    }
}
