use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use ess_metrics::{MetricsConfig, Module};
use ess_storage::HolderConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Contents of the `--config` TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EssConfig {
    pub data_dir: PathBuf,
    pub storage: HolderConfig,
    pub metrics: MetricsConfig,
    pub server: ServerConfig,
}

impl Default for EssConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            storage: HolderConfig::default(),
            metrics: MetricsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Static facts about the server reported alongside stored counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub locale: String,
    pub permissions_handler: String,
    pub modules: Vec<Module>,
    pub signs: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            locale: "English".into(),
            permissions_handler: "SuperPerms".into(),
            modules: vec![Module::Essentials],
            signs: Vec::new(),
        }
    }
}

impl EssConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load the file named by `--config`, if any, then apply flag overrides.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(dir) = &cli.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(ms) = cli.lock_timeout_ms {
            let timeout = (ms > 0).then(|| Duration::from_millis(ms));
            config.storage = config.storage.with_lock_timeout(timeout);
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
