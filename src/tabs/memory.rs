//! Tab mirror used by the host daemon, the CLI and tests

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{Tab, TabControl, TabError, TabId};

/// How long a relayed close waits for the browser to report back
pub const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

type CloseReply = oneshot::Sender<Result<(), TabError>>;

#[derive(Debug, Default)]
struct TabState {
    tabs: IndexMap<TabId, Tab>,
    active: Option<TabId>,
    pending: HashMap<TabId, CloseReply>,
    #[cfg(test)]
    busy_failures: u32,
    #[cfg(test)]
    remove_attempts: u32,
}

/// Tabs known from browser events.
///
/// Without a relay, removing a tab just drops it from the mirror. With one,
/// the close request is forwarded to the browser side and `remove` waits
/// until the browser reports the tab gone ([`MemoryTabs::forget`]) or the
/// close failed ([`MemoryTabs::close_failed`]).
#[derive(Debug, Default)]
pub struct MemoryTabs {
    state: Mutex<TabState>,
    relay: Option<mpsc::UnboundedSender<TabId>>,
}

impl MemoryTabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward close requests to `relay`
    pub fn with_relay(relay: mpsc::UnboundedSender<TabId>) -> Self {
        Self {
            state: Mutex::default(),
            relay: Some(relay),
        }
    }

    /// Insert or refresh a tab
    pub fn upsert(&self, tab: Tab) {
        self.lock().tabs.insert(tab.id, tab);
    }

    /// Mark a tab as the focused one
    pub fn activate(&self, tab_id: TabId) {
        self.lock().active = Some(tab_id);
    }

    /// Forget a tab the browser closed; completes a pending close
    pub fn forget(&self, tab_id: TabId) {
        let reply = {
            let mut state = self.lock();
            state.tabs.shift_remove(&tab_id);
            if state.active == Some(tab_id) {
                state.active = None;
            }
            state.pending.remove(&tab_id)
        };
        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
    }

    /// The browser refused to close `tab_id`. Returns false when no close
    /// was waiting for an answer.
    pub fn close_failed(&self, tab_id: TabId, error: TabError) -> bool {
        let Some(reply) = self.lock().pending.remove(&tab_id) else {
            debug!("Close failure for tab {} with no pending close: {}", tab_id, error);
            return false;
        };
        reply.send(Err(error)).is_ok()
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.lock().tabs.contains_key(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.lock().tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `count` removals fail as if a tab were being dragged
    #[cfg(test)]
    pub(crate) fn fail_busy(&self, count: u32) {
        self.lock().busy_failures = count;
    }

    /// Number of `remove` calls so far, failed ones included
    #[cfg(test)]
    pub(crate) fn remove_attempts(&self) -> u32 {
        self.lock().remove_attempts
    }

    #[cfg(test)]
    fn take_busy_failure(&self) -> bool {
        let mut state = self.lock();
        state.remove_attempts += 1;
        if state.busy_failures == 0 {
            return false;
        }
        state.busy_failures -= 1;
        true
    }

    fn lock(&self) -> MutexGuard<'_, TabState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn drop_tab(&self, tab_id: TabId) {
        let mut state = self.lock();
        state.tabs.shift_remove(&tab_id);
        if state.active == Some(tab_id) {
            state.active = None;
        }
    }

    async fn relay_close(
        &self,
        relay: &mpsc::UnboundedSender<TabId>,
        tab_id: TabId,
    ) -> Result<(), TabError> {
        let (reply, answer) = oneshot::channel();
        if self.lock().pending.insert(tab_id, reply).is_some() {
            debug!("Replacing an unanswered close for tab {}", tab_id);
        }

        if relay.send(tab_id).is_err() {
            self.lock().pending.remove(&tab_id);
            return Err(TabError::Other("Browser connection closed".to_string()));
        }

        match tokio::time::timeout(CLOSE_REPLY_TIMEOUT, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TabError::Other(format!(
                "Close request for tab {} was superseded",
                tab_id
            ))),
            Err(_) => {
                self.lock().pending.remove(&tab_id);
                warn!("No answer from the browser closing tab {}", tab_id);
                Err(TabError::Other(format!(
                    "Timed out waiting for tab {} to close",
                    tab_id
                )))
            }
        }
    }
}

#[async_trait]
impl TabControl for MemoryTabs {
    async fn remove(&self, tab_id: TabId) -> Result<(), TabError> {
        #[cfg(test)]
        if self.take_busy_failure() {
            return Err(TabError::Busy);
        }
        if !self.contains(tab_id) {
            return Err(TabError::NotFound(tab_id));
        }

        if let Some(relay) = &self.relay {
            self.relay_close(relay, tab_id).await?;
        }
        self.drop_tab(tab_id);
        Ok(())
    }

    async fn active_tab(&self) -> Result<Option<Tab>, TabError> {
        let state = self.lock();
        Ok(state
            .active
            .and_then(|id| state.tabs.get(&id))
            .or_else(|| state.tabs.last().map(|(_, tab)| tab))
            .cloned())
    }
}
