//! Desktop notifications for error alerts
//!
//! Only failures are reported; successful bookmarks stay quiet.

use notify_rust::{Notification, Timeout};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use crate::tabs::TabId;

/// Global flag to enable/disable notifications
static NOTIFICATIONS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize notifications with the enabled setting
pub fn init(enabled: bool) {
    NOTIFICATIONS_ENABLED.store(enabled, Ordering::SeqCst);
}

/// Check if notifications are enabled
pub fn is_enabled() -> bool {
    NOTIFICATIONS_ENABLED.load(Ordering::SeqCst)
}

#[derive(Debug, Clone, Copy)]
pub enum NotificationKind {
    /// A rule's bookmark action was rejected by the bookmark store
    BookmarkError,
    /// A tab could not be closed
    TabError,
}

impl NotificationKind {
    fn icon(&self) -> &'static str {
        match self {
            NotificationKind::BookmarkError => "dialog-error",
            NotificationKind::TabError => "dialog-warning",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            NotificationKind::BookmarkError => "Bookmark Error",
            NotificationKind::TabError => "Tab Error",
        }
    }
}

/// Send a notification if enabled
///
/// This is fire-and-forget - errors are logged but don't propagate.
pub fn notify(kind: NotificationKind, message: &str) {
    if !is_enabled() {
        return;
    }

    let result = Notification::new()
        .appname("smartmark")
        .summary(&format!("smartmark: {}", kind.prefix()))
        .body(message)
        .icon(kind.icon())
        .timeout(Timeout::Milliseconds(5000))
        .show();

    if let Err(e) = result {
        warn!("Failed to send notification: {}", e);
    }
}

pub fn notify_bookmark_error(rule: &str, error: &str) {
    notify(
        NotificationKind::BookmarkError,
        &format!("Rule '{}' failed: {}", rule, error),
    );
}

pub fn notify_tab_error(tab_id: TabId, error: &str) {
    notify(
        NotificationKind::TabError,
        &format!("Tab {} was left open: {}", tab_id, error),
    );
}
