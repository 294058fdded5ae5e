//! Persisted key-value settings - rules, global toggles and editor history
//!
//! Everything smartmark persists lives in one flat JSON namespace. The
//! [`SettingsStore`] trait is the seam to whatever actually holds that
//! namespace; [`JsonStore`] keeps it in memory and optionally in a file.

mod store;

pub use store::JsonStore;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::rules::Rule;

/// The whole persisted namespace, in insertion order
pub type Namespace = IndexMap<String, Value>;

/// Storage keys
pub mod keys {
    pub const RULES: &str = "rules";
    pub const EXTENSION_ENABLED: &str = "extensionEnabled";
    pub const AUTO_BOOKMARK: &str = "autoBookmark";
    pub const AUTO_CLOSE_TAB: &str = "autoCloseTab";
    pub const CUSTOM_SHORTCUT: &str = "customShortcut";
    pub const UNDO_STACK: &str = "undoStack";
    pub const REDO_STACK: &str = "redoStack";
}

/// A single key changed in the store
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed settings document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value stored under '{key}': {source}")]
    InvalidValue {
        key: String,
        source: serde_json::Error,
    },
}

/// Persisted key-value store with change notifications
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetch the given keys; missing keys are absent from the result
    async fn get(&self, keys: &[&str]) -> Result<Namespace, StoreError>;

    /// Fetch the whole namespace
    async fn get_all(&self) -> Result<Namespace, StoreError>;

    /// Insert or overwrite the given keys
    async fn set(&self, items: Namespace) -> Result<(), StoreError>;

    /// Remove every key
    async fn clear(&self) -> Result<(), StoreError>;

    /// Subscribe to per-key change notifications
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Process-wide toggles gating every rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Master switch for automatic execution
    pub extension_enabled: bool,

    /// Whether matching rules create or modify bookmarks
    pub auto_bookmark: bool,

    /// Whether a rule's `closeTab` flag takes effect
    pub auto_close_tab: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            extension_enabled: true,
            auto_bookmark: true,
            auto_close_tab: false,
        }
    }
}

/// One of the three global toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    ExtensionEnabled,
    AutoBookmark,
    AutoCloseTab,
}

impl Toggle {
    pub fn key(self) -> &'static str {
        match self {
            Toggle::ExtensionEnabled => keys::EXTENSION_ENABLED,
            Toggle::AutoBookmark => keys::AUTO_BOOKMARK,
            Toggle::AutoCloseTab => keys::AUTO_CLOSE_TAB,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Toggle::ExtensionEnabled => "Extension",
            Toggle::AutoBookmark => "Automatic Bookmarking",
            Toggle::AutoCloseTab => "Automatic Tab Closing",
        }
    }
}

impl std::str::FromStr for Toggle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extension" | "extensionEnabled" => Ok(Toggle::ExtensionEnabled),
            "auto-bookmark" | "autoBookmark" => Ok(Toggle::AutoBookmark),
            "auto-close-tab" | "autoCloseTab" => Ok(Toggle::AutoCloseTab),
            other => Err(format!(
                "unknown toggle '{}' (expected extension, auto-bookmark or auto-close-tab)",
                other
            )),
        }
    }
}

/// Rules and toggles read together for one execution
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Stored rules by position; `None` marks an entry that failed to decode
    pub rules: Vec<Option<Rule>>,
    pub settings: GlobalSettings,
}

/// Read the rule list and the three toggles in a single `get`
pub async fn load_snapshot(store: &dyn SettingsStore) -> Result<Snapshot, StoreError> {
    let data = store
        .get(&[
            keys::RULES,
            keys::EXTENSION_ENABLED,
            keys::AUTO_BOOKMARK,
            keys::AUTO_CLOSE_TAB,
        ])
        .await?;

    Ok(Snapshot {
        rules: rule_slots_from(&data)?,
        settings: settings_from(&data),
    })
}

/// Read the rule list
pub async fn load_rules(store: &dyn SettingsStore) -> Result<Vec<Rule>, StoreError> {
    let data = store.get(&[keys::RULES]).await?;
    rules_from(&data)
}

/// Overwrite the rule list
pub async fn save_rules(store: &dyn SettingsStore, rules: &[Rule]) -> Result<(), StoreError> {
    let mut items = Namespace::new();
    items.insert(keys::RULES.to_string(), serde_json::to_value(rules)?);
    store.set(items).await
}

/// Read the global toggles, falling back to their defaults
pub async fn load_settings(store: &dyn SettingsStore) -> Result<GlobalSettings, StoreError> {
    let data = store
        .get(&[
            keys::EXTENSION_ENABLED,
            keys::AUTO_BOOKMARK,
            keys::AUTO_CLOSE_TAB,
        ])
        .await?;
    Ok(settings_from(&data))
}

/// Flip one global toggle
pub async fn set_toggle(
    store: &dyn SettingsStore,
    toggle: Toggle,
    value: bool,
) -> Result<(), StoreError> {
    let mut items = Namespace::new();
    items.insert(toggle.key().to_string(), Value::Bool(value));
    store.set(items).await
}

/// Read the custom keyboard shortcut, if one was saved
pub async fn load_shortcut(store: &dyn SettingsStore) -> Result<Option<String>, StoreError> {
    let data = store.get(&[keys::CUSTOM_SHORTCUT]).await?;
    Ok(data
        .get(keys::CUSTOM_SHORTCUT)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

fn rules_from(data: &Namespace) -> Result<Vec<Rule>, StoreError> {
    match data.get(keys::RULES) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|source| StoreError::InvalidValue {
                key: keys::RULES.to_string(),
                source,
            })
        }
    }
}

/// Decode each stored rule on its own so one bad entry can't disable the rest
fn rule_slots_from(data: &Namespace) -> Result<Vec<Option<Rule>>, StoreError> {
    let entries: Vec<Value> = match data.get(keys::RULES) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|source| StoreError::InvalidValue {
                key: keys::RULES.to_string(),
                source,
            })?
        }
    };

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("Ignoring unreadable rule {}: {}", index + 1, e);
                None
            }
        })
        .collect())
}

fn settings_from(data: &Namespace) -> GlobalSettings {
    let defaults = GlobalSettings::default();
    let flag = |key: &str, default: bool| match data.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            warn!("Ignoring non-boolean value for {}: {}", key, other);
            default
        }
    };

    GlobalSettings {
        extension_enabled: flag(keys::EXTENSION_ENABLED, defaults.extension_enabled),
        auto_bookmark: flag(keys::AUTO_BOOKMARK, defaults.auto_bookmark),
        auto_close_tab: flag(keys::AUTO_CLOSE_TAB, defaults.auto_close_tab),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_defaults_on_empty_store() {
        let store = JsonStore::in_memory();
        let snapshot = load_snapshot(&store).await.unwrap();

        assert!(snapshot.rules.is_empty());
        assert_eq!(snapshot.settings, GlobalSettings::default());
        assert!(snapshot.settings.extension_enabled);
        assert!(snapshot.settings.auto_bookmark);
        assert!(!snapshot.settings.auto_close_tab);
    }

    #[tokio::test]
    async fn test_snapshot_reads_rules_and_toggles() {
        let store = JsonStore::in_memory();
        save_rules(&store, &[Rule::for_domain("example.com")])
            .await
            .unwrap();
        set_toggle(&store, Toggle::AutoCloseTab, true).await.unwrap();
        set_toggle(&store, Toggle::ExtensionEnabled, false)
            .await
            .unwrap();

        let snapshot = load_snapshot(&store).await.unwrap();
        assert_eq!(snapshot.rules.len(), 1);
        assert!(!snapshot.settings.extension_enabled);
        assert!(snapshot.settings.auto_bookmark);
        assert!(snapshot.settings.auto_close_tab);
    }

    #[tokio::test]
    async fn test_malformed_rules_are_an_error() {
        let mut data = Namespace::new();
        data.insert(keys::RULES.to_string(), json!("not a list"));
        let store = JsonStore::with_data(data);

        let err = load_snapshot(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_rule_keeps_its_slot() {
        let mut data = Namespace::new();
        data.insert(
            keys::RULES.to_string(),
            json!([
                {"domain": "bad.com", "bookmarkAction": "archive"},
                {"domain": "example.com", "enabled": true},
            ]),
        );
        let store = JsonStore::with_data(data);

        let snapshot = load_snapshot(&store).await.unwrap();
        assert_eq!(snapshot.rules.len(), 2);
        assert!(snapshot.rules[0].is_none());
        assert_eq!(
            snapshot.rules[1].as_ref().unwrap().domain.as_deref(),
            Some("example.com")
        );

        // editing still refuses to rewrite a list it can't fully read
        assert!(matches!(
            load_rules(&store).await,
            Err(StoreError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_shortcut_roundtrip() {
        let store = JsonStore::in_memory();
        assert_eq!(load_shortcut(&store).await.unwrap(), None);

        let mut items = Namespace::new();
        items.insert(keys::CUSTOM_SHORTCUT.to_string(), json!("Ctrl+Shift+B"));
        store.set(items).await.unwrap();

        assert_eq!(
            load_shortcut(&store).await.unwrap().as_deref(),
            Some("Ctrl+Shift+B")
        );
    }

    #[test]
    fn test_toggle_from_str() {
        assert_eq!(
            "auto-close-tab".parse::<Toggle>().unwrap(),
            Toggle::AutoCloseTab
        );
        assert_eq!(
            "extensionEnabled".parse::<Toggle>().unwrap(),
            Toggle::ExtensionEnabled
        );
        assert!("dark-mode".parse::<Toggle>().is_err());
    }
}
