//! Tab closing with a bounded retry for transient failures

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{TabControl, TabError, TabId};

/// Wait before re-trying a close that failed because tabs were locked
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Result of asking for a tab to be closed
#[derive(Debug)]
pub enum CloseOutcome {
    Closed,

    /// The tab strip was busy; a timer task will try again. Awaiting the
    /// handle yields the final result, but nobody has to.
    RetryScheduled(JoinHandle<Result<(), TabError>>),

    /// The close failed for good; the tab stays open
    Failed(TabError),
}

/// Closes tabs, re-trying a bounded number of times when the browser
/// reports that tabs cannot be edited right now.
#[derive(Clone)]
pub struct TabCloser {
    tabs: Arc<dyn TabControl>,
    retry_delay: Duration,
    retry_limit: u32,
}

impl TabCloser {
    pub fn new(tabs: Arc<dyn TabControl>, retry_delay: Duration, retry_limit: u32) -> Self {
        Self {
            tabs,
            retry_delay,
            retry_limit,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Close `tab_id`. Never fails; problems are logged and reported in
    /// the outcome.
    pub async fn close(&self, tab_id: TabId) -> CloseOutcome {
        match self.tabs.remove(tab_id).await {
            Ok(()) => {
                info!("Tab closed: {}", tab_id);
                CloseOutcome::Closed
            }
            Err(e) if e.is_transient() && self.retry_limit > 0 => {
                warn!(
                    "Unable to close tab {}: {}. Retrying in {:?}",
                    tab_id, e, self.retry_delay
                );
                let handle = tokio::spawn(retry(
                    Arc::clone(&self.tabs),
                    tab_id,
                    self.retry_delay,
                    self.retry_limit,
                ));
                CloseOutcome::RetryScheduled(handle)
            }
            Err(e) => {
                give_up(tab_id, &e);
                CloseOutcome::Failed(e)
            }
        }
    }
}

async fn retry(
    tabs: Arc<dyn TabControl>,
    tab_id: TabId,
    delay: Duration,
    attempts: u32,
) -> Result<(), TabError> {
    let mut remaining = attempts;
    loop {
        tokio::time::sleep(delay).await;
        remaining -= 1;

        match tabs.remove(tab_id).await {
            Ok(()) => {
                info!("Tab closed on retry: {}", tab_id);
                return Ok(());
            }
            Err(e) if e.is_transient() && remaining > 0 => {
                warn!("Tab {} still busy, {} retries left", tab_id, remaining);
            }
            Err(e) => {
                give_up(tab_id, &e);
                return Err(e);
            }
        }
    }
}

fn give_up(tab_id: TabId, e: &TabError) {
    error!("Error closing tab {}: {}", tab_id, e);
    crate::notifications::notify_tab_error(tab_id, &e.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabs::{MemoryTabs, Tab};

    fn setup(busy: u32) -> (Arc<MemoryTabs>, TabCloser) {
        let tabs = Arc::new(MemoryTabs::new());
        tabs.upsert(Tab::new(7, "https://a.test/", "a"));
        tabs.fail_busy(busy);
        let closer = TabCloser::new(tabs.clone(), DEFAULT_RETRY_DELAY, 1);
        (tabs, closer)
    }

    #[tokio::test]
    async fn test_close_succeeds_first_time() {
        let (tabs, closer) = setup(0);
        assert!(matches!(closer.close(7).await, CloseOutcome::Closed));
        assert!(!tabs.contains(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_close_is_retried_once() {
        let (tabs, closer) = setup(1);

        let CloseOutcome::RetryScheduled(handle) = closer.close(7).await else {
            panic!("expected a scheduled retry");
        };
        assert!(tabs.contains(7));

        let start = tokio::time::Instant::now();
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert!(start.elapsed() >= DEFAULT_RETRY_DELAY);
        assert!(!tabs.contains(7));
        assert_eq!(tabs.remove_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_bounded() {
        let (tabs, closer) = setup(5);

        let CloseOutcome::RetryScheduled(handle) = closer.close(7).await else {
            panic!("expected a scheduled retry");
        };

        assert_eq!(handle.await.unwrap(), Err(TabError::Busy));
        assert!(tabs.contains(7));
        assert_eq!(tabs.remove_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_higher_retry_limit() {
        let tabs = Arc::new(MemoryTabs::new());
        tabs.upsert(Tab::new(7, "https://a.test/", "a"));
        tabs.fail_busy(2);
        let closer = TabCloser::new(tabs.clone(), DEFAULT_RETRY_DELAY, 3);

        let CloseOutcome::RetryScheduled(handle) = closer.close(7).await else {
            panic!("expected a scheduled retry");
        };
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert_eq!(tabs.remove_attempts(), 3);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let (tabs, closer) = setup(0);
        assert!(matches!(
            closer.close(99).await,
            CloseOutcome::Failed(TabError::NotFound(99))
        ));
        assert_eq!(tabs.remove_attempts(), 1);
    }
}
