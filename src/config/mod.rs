//! Configuration management

mod schema;

pub use schema::{Config, GeneralConfig};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::persist::write_locked;

impl Config {
    /// Load configuration from a file or default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .context("Could not determine config path")?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file (with advisory file locking)
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .context("Could not determine config path")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        write_locked(&config_path, &content)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))
    }

    /// Get the default config file path
    /// Uses the platform config directory (via dirs::config_dir), falling back to ~/.config
    pub fn default_path() -> Option<PathBuf> {
        let config_base =
            dirs::config_dir().or_else(|| dirs::home_dir().map(|d| d.join(".config")))?;
        Some(config_base.join("smartmark").join("config.toml"))
    }

    /// Get the default data directory
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("smartmark"))
    }

    /// Resolved settings namespace file
    pub fn storage_path(&self) -> Result<PathBuf> {
        resolve(self.general.storage_path.as_deref(), "storage.json")
    }

    /// Resolved bookmark tree file
    pub fn bookmarks_path(&self) -> Result<PathBuf> {
        resolve(self.general.bookmarks_path.as_deref(), "bookmarks.json")
    }

    pub fn close_retry_delay(&self) -> Duration {
        Duration::from_millis(self.general.close_retry_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.general.debounce_ms)
    }
}

fn resolve(configured: Option<&Path>, file_name: &str) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(crate::expand_path(path)),
        None => Config::data_dir()
            .map(|dir| dir.join(file_name))
            .context("Could not determine data directory"),
    }
}
