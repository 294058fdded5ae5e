//! Rule engine - runs the winning rule for a tab

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::{Policy, Rule, select};
use crate::bookmarks::{BookmarkStore, ReconcileOutcome, reconcile};
use crate::settings::{self, SettingsStore, StoreError};
use crate::tabs::{CloseOutcome, DEFAULT_RETRY_DELAY, Tab, TabCloser, TabControl, TabError};

/// Result of one rule run
#[derive(Debug)]
pub enum Execution {
    /// No rule applied, or the rules could not be read
    NotApplied,
    Applied(Applied),
}

impl Execution {
    /// True when a rule was selected and its bookmark action attempted
    pub fn applied(&self) -> bool {
        matches!(self, Execution::Applied(_))
    }
}

/// What happened when a rule was applied
#[derive(Debug)]
pub struct Applied {
    /// Position of the rule in the stored list
    pub rule_index: usize,
    pub rule: Rule,
    pub bookmark: ReconcileOutcome,
    /// `None` when closing was not requested
    pub close: Option<CloseOutcome>,
}

/// Failure to run rules for a manual trigger
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("No active tab found")]
    NoActiveTab,

    #[error(transparent)]
    Tab(#[from] TabError),
}

/// Engine for evaluating rules against tabs
pub struct RuleEngine {
    settings: Arc<dyn SettingsStore>,
    bookmarks: Arc<dyn BookmarkStore>,
    tabs: Arc<dyn TabControl>,
    closer: TabCloser,
    policy: Policy,
}

impl RuleEngine {
    /// Create a new rule engine over the given services
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        bookmarks: Arc<dyn BookmarkStore>,
        tabs: Arc<dyn TabControl>,
        policy: Policy,
    ) -> Self {
        let closer = TabCloser::new(Arc::clone(&tabs), DEFAULT_RETRY_DELAY, policy.close_retry_limit);
        Self {
            settings,
            bookmarks,
            tabs,
            closer,
            policy,
        }
    }

    /// Override the wait before re-trying a busy tab close
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.closer = TabCloser::new(Arc::clone(&self.tabs), delay, self.policy.close_retry_limit);
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn bookmarks(&self) -> &Arc<dyn BookmarkStore> {
        &self.bookmarks
    }

    /// Find the rule that would run for `url` without touching bookmarks or tabs
    pub async fn evaluate(
        &self,
        url: &str,
        is_manual: bool,
    ) -> Result<Option<(usize, Rule)>, StoreError> {
        let snapshot = settings::load_snapshot(self.settings.as_ref()).await?;
        Ok(
            select(&snapshot.rules, url, is_manual, &snapshot.settings, &self.policy)
                .map(|winner| (winner.index, winner.rule.clone())),
        )
    }

    /// Run rules for `tab`; true when a rule was selected and applied.
    pub async fn execute_rules(&self, tab: &Tab, is_manual: bool) -> bool {
        self.execute(tab, is_manual).await.applied()
    }

    /// Run rules for `tab` and report what happened.
    ///
    /// Never fails: a storage error is logged and reported as
    /// [`Execution::NotApplied`], bookmark and tab failures are carried in
    /// the [`Applied`] outcome.
    pub async fn execute(&self, tab: &Tab, is_manual: bool) -> Execution {
        let snapshot = match settings::load_snapshot(self.settings.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Error executing rules: {}", e);
                return Execution::NotApplied;
            }
        };
        let toggles = snapshot.settings;

        let Some(winner) = select(&snapshot.rules, &tab.url, is_manual, &toggles, &self.policy)
        else {
            debug!("No matching rule for {}", tab.url);
            return Execution::NotApplied;
        };
        let rule = winner.rule.clone();
        let rule_index = winner.index;

        let should_bookmark =
            toggles.auto_bookmark || (is_manual && self.policy.manual_forces_bookmark);
        let bookmark = reconcile(self.bookmarks.as_ref(), &rule, tab, should_bookmark).await;
        if let Some(reason) = bookmark.error() {
            crate::notifications::notify_bookmark_error(&rule.to_string(), reason);
        }

        let close_allowed =
            toggles.auto_close_tab || (is_manual && self.policy.manual_forces_close);
        let close = if close_allowed && rule.close_tab {
            Some(self.closer.close(tab.id).await)
        } else {
            None
        };

        info!(
            "Rule {} ({}) applied to tab {}{}",
            rule_index + 1,
            rule,
            tab.id,
            if is_manual { " (manual)" } else { "" }
        );
        Execution::Applied(Applied {
            rule_index,
            rule,
            bookmark,
            close,
        })
    }

    /// Run rules for the focused tab, as a manual trigger
    pub async fn execute_for_active_tab(&self) -> Result<Execution, TriggerError> {
        let tab = self
            .tabs
            .active_tab()
            .await?
            .ok_or(TriggerError::NoActiveTab)?;
        Ok(self.execute(&tab, true).await)
    }
}
