//! Engine configuration, layered TOML file + environment overrides.
//!
//! The file path comes from `CASCADE_CONFIG_PATH` (default `cascade.toml`);
//! a missing file just yields the defaults. Individual environment
//! variables override whatever the file said.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub flows: FlowsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base of the linear retry backoff, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Deadline applied to handler calls without their own timeout.
    pub default_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 500,
            default_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlowsConfig {
    /// Directories scanned for `.flow` files at startup.
    pub paths: Vec<PathBuf>,
}

impl Config {
    /// Load configuration from disk and the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("CASCADE_CONFIG_PATH")
            .unwrap_or_else(|_| "cascade.toml".to_string());
        let mut config = if std::path::Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path))?;
            Self::from_toml_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path))?
        } else {
            Self::default()
        };

        if let Ok(ms) = std::env::var("CASCADE_RETRY_BACKOFF_MS") {
            config.engine.retry_backoff_ms = ms
                .parse()
                .context("CASCADE_RETRY_BACKOFF_MS must be an integer")?;
        }
        if let Ok(paths) = std::env::var("CASCADE_FLOW_PATHS") {
            config.flows.paths = paths
                .split(':')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
