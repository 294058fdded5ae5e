//! Bookmark folder listing, lookup and caching

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

use super::{BookmarkNode, BookmarkStore};

/// A folder rules can target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub id: String,
    pub title: String,
}

/// Flatten every folder of a tree in depth-first order
pub fn collect_folders(nodes: &[BookmarkNode]) -> Vec<Folder> {
    fn walk(nodes: &[BookmarkNode], out: &mut Vec<Folder>) {
        for node in nodes {
            if let Some(children) = &node.children {
                out.push(Folder {
                    id: node.id.clone(),
                    title: node.title.clone(),
                });
                walk(children, out);
            }
        }
    }

    let mut folders = Vec::new();
    walk(nodes, &mut folders);
    folders
}

/// Case-insensitive title search; an empty term lists every folder
pub fn search_folders<'a>(folders: &'a [Folder], term: &str) -> Vec<&'a Folder> {
    let term = term.to_lowercase();
    folders
        .iter()
        .filter(|folder| folder.title.to_lowercase().contains(&term))
        .collect()
}

/// Title of the folder with `id`
pub fn folder_name<'a>(folders: &'a [Folder], id: &str) -> Option<&'a str> {
    folders
        .iter()
        .find(|folder| folder.id == id)
        .map(|folder| folder.title.as_str())
}

/// Read-through cache of the folder list.
///
/// Populated on first use and kept until [`FolderCache::invalidate`] is
/// called in response to a bookmark change notification.
#[derive(Debug, Default)]
pub struct FolderCache {
    folders: Mutex<Option<Arc<Vec<Folder>>>>,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached folders, fetching the tree on a miss. A failed fetch is
    /// logged and yields an empty list that is not cached.
    pub async fn folders(&self, store: &dyn BookmarkStore) -> Arc<Vec<Folder>> {
        if let Some(cached) = self.cached() {
            return cached;
        }

        match store.get_tree().await {
            Ok(tree) => {
                let folders = Arc::new(collect_folders(&tree));
                debug!("Cached {} bookmark folders", folders.len());
                *self.slot() = Some(Arc::clone(&folders));
                folders
            }
            Err(e) => {
                error!("Error fetching bookmark folders: {}", e);
                Arc::new(Vec::new())
            }
        }
    }

    /// Drop the cached list so the next call refetches it
    pub fn invalidate(&self) {
        if self.slot().take().is_some() {
            debug!("Bookmark folder cache invalidated");
        }
    }

    pub fn is_cached(&self) -> bool {
        self.slot().is_some()
    }

    fn cached(&self) -> Option<Arc<Vec<Folder>>> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Vec<Folder>>>> {
        self.folders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::{BOOKMARKS_BAR_ID, BookmarkTree};

    fn sample() -> Vec<Folder> {
        vec![
            Folder {
                id: "1".to_string(),
                title: "Bookmarks bar".to_string(),
            },
            Folder {
                id: "7".to_string(),
                title: "Rust Reading".to_string(),
            },
        ]
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let folders = sample();
        let found = search_folders(&folders, "rust");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "7");

        assert_eq!(search_folders(&folders, "").len(), 2);
        assert!(search_folders(&folders, "python").is_empty());
    }

    #[test]
    fn test_folder_name_lookup() {
        let folders = sample();
        assert_eq!(folder_name(&folders, "7"), Some("Rust Reading"));
        assert_eq!(folder_name(&folders, "9"), None);
    }

    #[tokio::test]
    async fn test_cache_is_read_through_until_invalidated() {
        let tree = BookmarkTree::in_memory();
        let cache = FolderCache::new();

        let first = cache.folders(&tree).await;
        assert_eq!(first.len(), 3);
        assert!(cache.is_cached());

        tree.add_folder(BOOKMARKS_BAR_ID, "New").unwrap();
        assert_eq!(cache.folders(&tree).await.len(), 3);

        cache.invalidate();
        assert!(!cache.is_cached());
        let refreshed = cache.folders(&tree).await;
        assert_eq!(refreshed.len(), 4);
        assert_eq!(refreshed[2].title, "New");
    }
}
