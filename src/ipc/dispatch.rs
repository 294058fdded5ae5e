//! Single dispatch table for every host message

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{APPLY_RULES_COMMAND, Message, Outbound, Response};
use crate::bookmarks::FolderCache;
use crate::rules::{Execution, RuleEngine};
use crate::settings::{self, StorageChange};
use crate::shortcut::{KeyEvent, Shortcut};
use crate::tabs::{MemoryTabs, TabError, TabStatus};

/// Routes host messages to the rule engine and the tab mirror
pub struct Dispatcher {
    engine: Arc<RuleEngine>,
    tabs: Arc<MemoryTabs>,
    folders: Arc<FolderCache>,
    options_version: AtomicU64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<RuleEngine>,
        tabs: Arc<MemoryTabs>,
        folders: Arc<FolderCache>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            engine,
            tabs,
            folders,
            options_version: AtomicU64::new(0),
            outbound,
        }
    }

    pub fn folders(&self) -> &Arc<FolderCache> {
        &self.folders
    }

    pub fn options_version(&self) -> u64 {
        self.options_version.load(Ordering::SeqCst)
    }

    pub async fn dispatch(&self, message: Message) -> Response {
        match message {
            Message::TabUpdated { tab, status } => {
                self.tabs.upsert(tab.clone());
                if status != Some(TabStatus::Complete) {
                    return Response::Ok;
                }
                let success = self.engine.execute_rules(&tab, false).await;
                Response::Executed {
                    success,
                    error: None,
                }
            }
            Message::TabActivated { tab_id } => {
                self.tabs.activate(tab_id);
                Response::Ok
            }
            Message::TabRemoved { tab_id } => {
                self.tabs.forget(tab_id);
                Response::Ok
            }
            Message::TabCloseFailed { tab_id, error } => {
                let error = TabError::from_message(error);
                if !self.tabs.close_failed(tab_id, error) {
                    debug!("Ignoring late close failure for tab {}", tab_id);
                }
                Response::Ok
            }
            Message::ManualExecute | Message::CustomShortcut => self.run_manual().await,
            Message::Command { name } if name == APPLY_RULES_COMMAND => self.run_manual().await,
            Message::Command { name } => Response::Error {
                message: format!("Unknown command: {}", name),
            },
            Message::CheckShortcut { event } => self.check_shortcut(&event).await,
            Message::OptionsChanged { key, value } => {
                self.options_changed(key, value);
                Response::Ok
            }
            Message::GetOptionsVersion => Response::OptionsVersion {
                version: self.options_version(),
            },
            Message::BookmarksChanged => {
                self.folders.invalidate();
                Response::Ok
            }
        }
    }

    /// Forward a store change to open pages
    pub fn settings_changed(&self, change: StorageChange) {
        self.options_changed(Some(change.key), change.new_value);
    }

    async fn run_manual(&self) -> Response {
        match self.engine.execute_for_active_tab().await {
            Ok(execution) => {
                if let Execution::Applied(applied) = &execution {
                    info!("Manual run applied rule {}", applied.rule_index + 1);
                }
                Response::Executed {
                    success: execution.applied(),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Manual run failed: {}", e);
                Response::Executed {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn check_shortcut(&self, event: &KeyEvent) -> Response {
        let stored = match settings::load_shortcut(self.engine.settings().as_ref()).await {
            Ok(stored) => stored,
            Err(e) => {
                return Response::Error {
                    message: e.to_string(),
                };
            }
        };

        let matches_shortcut = match stored.as_deref().map(str::parse::<Shortcut>) {
            Some(Ok(shortcut)) => shortcut.matches(event),
            Some(Err(e)) => {
                warn!("Ignoring stored shortcut: {}", e);
                false
            }
            None => false,
        };
        Response::Shortcut { matches_shortcut }
    }

    fn options_changed(&self, key: Option<String>, value: Option<serde_json::Value>) {
        let version = self.options_version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Options version {} ({:?})", version, key);
        if self
            .outbound
            .send(Outbound::OptionsChanged { key, value })
            .is_err()
        {
            debug!("Outbound channel closed, options change not forwarded");
        }
    }
}
