use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use schoolgate::config::{resolve_config_path, SchoolgateConfig};
use tokio::fs;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: SchoolgateConfig,
    pub path: Option<PathBuf>,
}

/// Reads the config file (if any) and applies `SCHOOLGATE_*` overrides.
/// Runs before logging is initialised, so it only records what it did.
pub async fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = resolve_config_path(explicit);

    let mut config = match &path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            SchoolgateConfig::from_yaml_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        Some(path) if explicit.is_some() => {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        _ => SchoolgateConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid SCHOOLGATE_* environment override")?;

    Ok(LoadedConfig {
        path: path.filter(|path| path.exists()),
        config,
    })
}

pub fn describe_source(path: Option<&Path>) {
    match path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
}
