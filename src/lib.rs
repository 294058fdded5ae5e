//! smartmark - rule-based automatic bookmarking
//!
//! Watches page loads reported by the browser, picks the highest-priority
//! matching rule and bookmarks (or closes) the tab accordingly.

pub mod backup;
pub mod bookmarks;
pub mod config;
pub mod editor;
pub mod ipc;
pub mod notifications;
mod persist;
pub mod rules;
pub mod settings;
pub mod shortcut;
pub mod tabs;
pub mod watcher;

pub use bookmarks::{BookmarkStore, BookmarkTree, FolderCache};
pub use config::Config;
pub use editor::RuleEditor;
pub use rules::{BookmarkAction, Execution, Policy, Rule, RuleEngine};
pub use settings::{GlobalSettings, JsonStore, SettingsStore};
pub use tabs::{MemoryTabs, Tab, TabControl};
pub use watcher::FileWatcher;

/// Current version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Expand ~ and environment variables ($VAR, ${VAR}) in a path
pub fn expand_path(path: &std::path::Path) -> std::path::PathBuf {
    let path_str = path.to_string_lossy();

    // First expand ~ prefix
    let expanded = if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            home.join(stripped).to_string_lossy().to_string()
        } else {
            path_str.to_string()
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            home.to_string_lossy().to_string()
        } else {
            path_str.to_string()
        }
    } else {
        path_str.to_string()
    };

    // Then expand $VAR and ${VAR} patterns
    use std::sync::LazyLock;
    static ENV_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("invalid env regex")
    });

    let result = ENV_RE.replace_all(&expanded, |caps: &regex::Captures| {
        let var_name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    std::path::PathBuf::from(result.as_ref())
}
