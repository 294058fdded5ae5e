//! Configuration schema

use crate::rules::Policy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Matching and execution behavior
    #[serde(default)]
    pub policy: Policy,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Settings namespace file (rules, toggles, shortcut, editor history)
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Bookmark tree file
    #[serde(default)]
    pub bookmarks_path: Option<PathBuf>,

    /// Milliseconds to wait before re-trying a busy tab close
    #[serde(default = "default_close_retry_delay")]
    pub close_retry_delay_ms: u64,

    /// Milliseconds to coalesce file change events for
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Enable desktop notifications for errors
    #[serde(default)]
    pub notifications_enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage_path: None,
            bookmarks_path: None,
            close_retry_delay_ms: default_close_retry_delay(),
            debounce_ms: default_debounce(),
            notifications_enabled: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_close_retry_delay() -> u64 {
    1000
}

fn default_debounce() -> u64 {
    250
}
