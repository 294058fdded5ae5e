//! Browser tabs - the pages rules run against and the control to close them

mod closer;
mod memory;

pub use closer::{CloseOutcome, DEFAULT_RETRY_DELAY, TabCloser};
pub use memory::MemoryTabs;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TabId = i64;

/// Message the browser reports while the user is dragging a tab
const BUSY_MESSAGE: &str = "Tabs cannot be edited right now";

/// A browser tab as seen when a page finishes loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl Tab {
    pub fn new(id: TabId, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Load state reported with a tab update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabError {
    /// The tab strip is locked, usually because a tab is being dragged
    #[error("Tabs cannot be edited right now (user may be dragging a tab)")]
    Busy,

    #[error("No tab with id: {0}")]
    NotFound(TabId),

    #[error("{0}")]
    Other(String),
}

impl TabError {
    /// Classify a raw error message from the browser
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(BUSY_MESSAGE) {
            TabError::Busy
        } else {
            TabError::Other(message)
        }
    }

    /// Worth retrying after a short delay
    pub fn is_transient(&self) -> bool {
        matches!(self, TabError::Busy)
    }
}

/// External tab control
#[async_trait]
pub trait TabControl: Send + Sync {
    async fn remove(&self, tab_id: TabId) -> Result<(), TabError>;

    /// The focused tab of the current window
    async fn active_tab(&self) -> Result<Option<Tab>, TabError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_browser_messages() {
        let busy = TabError::from_message(
            "Tabs cannot be edited right now (user may be dragging a tab).",
        );
        assert_eq!(busy, TabError::Busy);
        assert!(busy.is_transient());

        let other = TabError::from_message("No tab with id: 5.");
        assert!(matches!(other, TabError::Other(_)));
        assert!(!other.is_transient());
    }

    #[test]
    fn test_parse_tab_without_title() {
        let tab: Tab = serde_json::from_str(r#"{"id": 3, "url": "https://a.test/"}"#).unwrap();
        assert_eq!(tab, Tab::new(3, "https://a.test/", ""));
    }
}
