//! Per-target debounce for file events

use indexmap::IndexMap;
use std::time::{Duration, Instant};

use super::WatchTarget;

/// Holds each changed target back until its file has been quiet for the
/// debounce window, so a burst of writes yields a single reload after the
/// last one.
#[derive(Debug)]
pub(super) struct Debouncer {
    quiet: Duration,
    /// Last event per target, in order of first sighting
    pending: IndexMap<WatchTarget, Instant>,
}

impl Debouncer {
    pub(super) fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: IndexMap::new(),
        }
    }

    /// Record an event for `target` seen at `at`
    pub(super) fn touch(&mut self, target: WatchTarget, at: Instant) {
        self.pending.insert(target, at);
    }

    /// Take the targets that have been quiet since `now - quiet`
    pub(super) fn settled(&mut self, now: Instant) -> Vec<WatchTarget> {
        let mut ready = Vec::new();
        self.pending.retain(|target, last| {
            if now.duration_since(*last) >= self.quiet {
                ready.push(*target);
                false
            } else {
                true
            }
        });
        ready
    }

    #[cfg(test)]
    pub(super) fn is_pending(&self, target: WatchTarget) -> bool {
        self.pending.contains_key(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(250);

    #[test]
    fn test_burst_settles_once_after_last_event() {
        let mut debouncer = Debouncer::new(QUIET);
        let start = Instant::now();

        debouncer.touch(WatchTarget::Settings, start);
        debouncer.touch(WatchTarget::Settings, start + Duration::from_millis(200));

        assert!(debouncer.settled(start + QUIET).is_empty());
        assert!(debouncer.is_pending(WatchTarget::Settings));

        let ready = debouncer.settled(start + Duration::from_millis(450));
        assert_eq!(ready, vec![WatchTarget::Settings]);
        assert!(debouncer.settled(start + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_targets_settle_independently() {
        let mut debouncer = Debouncer::new(QUIET);
        let start = Instant::now();

        debouncer.touch(WatchTarget::Bookmarks, start);
        debouncer.touch(WatchTarget::Settings, start + Duration::from_millis(100));

        assert_eq!(debouncer.settled(start + QUIET), vec![WatchTarget::Bookmarks]);
        assert!(debouncer.is_pending(WatchTarget::Settings));
        assert_eq!(
            debouncer.settled(start + Duration::from_millis(350)),
            vec![WatchTarget::Settings]
        );
    }
}
