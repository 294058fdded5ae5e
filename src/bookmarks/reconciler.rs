//! Bookmark reconciliation - applies a rule's bookmark action to a tab

use tracing::{debug, error, info};

use super::{BookmarkChanges, BookmarkError, BookmarkRecord, BookmarkStore};
use crate::rules::{BookmarkAction, Rule};
use crate::tabs::Tab;

/// What reconciliation did to the bookmark store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Bookmarking is switched off; the store was not touched
    Suppressed,

    /// A new bookmark was created
    Created(BookmarkRecord),

    /// An existing bookmark was rewritten, and moved if its folder differed
    Updated { record: BookmarkRecord, moved: bool },

    /// `doNothing` found an existing bookmark
    AlreadyBookmarked(BookmarkRecord),

    /// `replace` rewrote the bookmark but could not move it to the rule's folder
    MoveFailed {
        record: BookmarkRecord,
        error: String,
    },

    /// The store rejected a call before anything was changed
    Failed(String),
}

impl ReconcileOutcome {
    /// True when the bookmark store was changed
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Created(_)
                | ReconcileOutcome::Updated { .. }
                | ReconcileOutcome::MoveFailed { .. }
        )
    }

    /// The store error to surface to the user, if any
    pub fn error(&self) -> Option<&str> {
        match self {
            ReconcileOutcome::Failed(error) | ReconcileOutcome::MoveFailed { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }
}

/// Make the bookmark store reflect `rule`'s action for `tab`.
///
/// Store failures are logged and reported as [`ReconcileOutcome::Failed`];
/// they never propagate.
pub async fn reconcile(
    store: &dyn BookmarkStore,
    rule: &Rule,
    tab: &Tab,
    should_bookmark: bool,
) -> ReconcileOutcome {
    if !should_bookmark {
        debug!("Bookmarking disabled, leaving bookmarks for {} alone", tab.url);
        return ReconcileOutcome::Suppressed;
    }

    match apply(store, rule, tab).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Error bookmarking {}: {}", tab.url, e);
            ReconcileOutcome::Failed(e.to_string())
        }
    }
}

async fn apply(
    store: &dyn BookmarkStore,
    rule: &Rule,
    tab: &Tab,
) -> Result<ReconcileOutcome, BookmarkError> {
    let folder = rule.bookmark_location.as_deref();
    let existing = store.search(&tab.url).await?;

    match rule.bookmark_action {
        BookmarkAction::DoNothing => match existing.into_iter().next() {
            Some(record) => {
                debug!("{} already bookmarked as {}", tab.url, record.id);
                Ok(ReconcileOutcome::AlreadyBookmarked(record))
            }
            None => create(store, folder, tab).await,
        },

        BookmarkAction::Replace => match existing.into_iter().next() {
            Some(record) => {
                let mut updated = store
                    .update(
                        &record.id,
                        BookmarkChanges {
                            title: Some(tab.title.clone()),
                            url: Some(tab.url.clone()),
                        },
                    )
                    .await?;
                info!("Bookmark updated: {} ({})", updated.title, updated.id);

                let mut moved = false;
                if let Some(folder) = folder
                    && record.parent_id != folder
                {
                    match store.move_to(&record.id, folder).await {
                        Ok(record) => updated = record,
                        Err(e) => {
                            error!("Error moving bookmark {} to {}: {}", updated.id, folder, e);
                            return Ok(ReconcileOutcome::MoveFailed {
                                record: updated,
                                error: e.to_string(),
                            });
                        }
                    }
                    info!("Bookmark {} moved to folder {}", updated.id, folder);
                    moved = true;
                }

                Ok(ReconcileOutcome::Updated {
                    record: updated,
                    moved,
                })
            }
            None => create(store, folder, tab).await,
        },

        BookmarkAction::Duplicate => create(store, folder, tab).await,
    }
}

async fn create(
    store: &dyn BookmarkStore,
    folder: Option<&str>,
    tab: &Tab,
) -> Result<ReconcileOutcome, BookmarkError> {
    let record = store.create(folder, &tab.title, &tab.url).await?;
    info!(
        "Bookmark created: {} -> {} in folder {}",
        record.title, record.url, record.parent_id
    );
    Ok(ReconcileOutcome::Created(record))
}
