//! Config store for loading and saving lars2aws.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{Lars2AwsConfig, parser};

pub const CONFIG_FILE_NAME: &str = "lars2aws.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the platform config directory (`~/.config/lars2aws`).
    pub fn from_default_location() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("lars2aws");
        Ok(Self::from_dir(dir))
    }

    pub fn from_dir(dir: PathBuf) -> Self {
        Self {
            config_path: dir.join(CONFIG_FILE_NAME),
        }
    }

    pub fn from_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file, or defaults when it does not exist.
    pub fn load(&self) -> anyhow::Result<Lars2AwsConfig> {
        if !self.config_path.exists() {
            return Ok(Lars2AwsConfig::new());
        }
        parser::parse_config_toml(&self.config_path)
    }

    /// Load the file and layer environment overrides on top.
    pub fn load_with_env(&self) -> anyhow::Result<Lars2AwsConfig> {
        let mut config = self.load()?;
        config
            .apply_process_env()
            .context("Invalid environment override")?;
        parser::validate_config(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &Lars2AwsConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
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
