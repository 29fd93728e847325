//! Config store for loading and saving l0.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::L0Config;

const CONFIG_FILE: &str = "l0.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// `<config_dir>/l0/l0.toml`
    pub fn from_default_dir() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("l0");
        Ok(Self::from_dir(dir))
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: dir.into().join(CONFIG_FILE),
        }
    }

    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Loads the file, or `default_instance` defaults when it is missing.
    /// Environment overrides are applied and the result validated.
    pub fn load(&self, default_instance: &str) -> anyhow::Result<L0Config> {
        let mut config = self.load_file(default_instance)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", self.config_path.display()))?;
        Ok(config)
    }

    /// Loads the file without environment overrides or validation.
    pub fn load_file(&self, default_instance: &str) -> anyhow::Result<L0Config> {
        if !self.config_path.exists() {
            return Ok(L0Config::new(default_instance));
        }
        let content = std::fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;
        toml::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })
    }

    pub fn save(&self, config: &L0Config) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
