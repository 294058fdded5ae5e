//! In-memory bookmark tree, optionally mirrored to a JSON file

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{BookmarkChanges, BookmarkError, BookmarkNode, BookmarkRecord, BookmarkStore};
use crate::persist::{read_locked, write_locked};

/// Root of the tree
pub const ROOT_ID: &str = "0";
/// Top-level "Bookmarks bar" folder
pub const BOOKMARKS_BAR_ID: &str = "1";
/// Top-level "Other bookmarks" folder, the default parent for new bookmarks
pub const OTHER_BOOKMARKS_ID: &str = "2";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_added: Option<i64>,
}

impl Node {
    fn folder(id: &str, parent_id: Option<&str>, title: &str) -> Self {
        Self {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            title: title.to_string(),
            url: None,
            date_added: None,
        }
    }

    fn is_folder(&self) -> bool {
        self.url.is_none()
    }

    fn record(&self) -> BookmarkRecord {
        BookmarkRecord {
            id: self.id.clone(),
            parent_id: self.parent_id.clone().unwrap_or_default(),
            title: self.title.clone(),
            url: self.url.clone().unwrap_or_default(),
            date_added: self.date_added,
        }
    }
}

/// Flat node table; insertion order doubles as sibling order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeData {
    next_id: u64,
    nodes: IndexMap<String, Node>,
}

impl Default for TreeData {
    fn default() -> Self {
        let nodes = [
            Node::folder(ROOT_ID, None, ""),
            Node::folder(BOOKMARKS_BAR_ID, Some(ROOT_ID), "Bookmarks bar"),
            Node::folder(OTHER_BOOKMARKS_ID, Some(ROOT_ID), "Other bookmarks"),
        ]
        .into_iter()
        .map(|node| (node.id.clone(), node))
        .collect();

        Self { next_id: 3, nodes }
    }
}

impl TreeData {
    fn allocate_id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    fn folder(&self, id: &str) -> Result<&Node, BookmarkError> {
        self.nodes
            .get(id)
            .filter(|node| node.is_folder())
            .ok_or_else(|| BookmarkError::ParentNotFound(id.to_string()))
    }

    fn is_fixed(id: &str) -> bool {
        id == ROOT_ID || id == BOOKMARKS_BAR_ID || id == OTHER_BOOKMARKS_ID
    }

    fn is_ancestor<'a>(&'a self, ancestor: &str, mut id: &'a str) -> bool {
        while let Some(node) = self.nodes.get(id) {
            if node.id == ancestor {
                return true;
            }
            match node.parent_id.as_deref() {
                Some(parent) => id = parent,
                None => break,
            }
        }
        false
    }

    fn insert(&mut self, parent_id: &str, title: &str, url: Option<&str>) -> Result<Node, BookmarkError> {
        self.folder(parent_id)?;
        let node = Node {
            id: self.allocate_id(),
            parent_id: Some(parent_id.to_string()),
            title: title.to_string(),
            url: url.map(str::to_string),
            date_added: Some(chrono::Utc::now().timestamp_millis()),
        };
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    fn subtree(&self, id: &str) -> Option<BookmarkNode> {
        let node = self.nodes.get(id)?;
        let children = node.is_folder().then(|| {
            self.nodes
                .values()
                .filter(|child| child.parent_id.as_deref() == Some(id))
                .filter_map(|child| self.subtree(&child.id))
                .collect()
        });

        Some(BookmarkNode {
            id: node.id.clone(),
            title: node.title.clone(),
            url: node.url.clone(),
            children,
        })
    }
}

/// Chrome-like bookmark tree with the fixed roots `0`, `1` and `2`.
///
/// Opened from a path, every mutation is written back to that file.
pub struct BookmarkTree {
    path: Option<PathBuf>,
    data: Mutex<TreeData>,
}

impl Default for BookmarkTree {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl BookmarkTree {
    /// Create a tree that only holds the fixed root folders
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(TreeData::default()),
        }
    }

    /// Open a file-backed tree; a missing file starts with the root folders
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BookmarkError> {
        let path = path.into();
        let data = read_tree(&path)?;
        debug!(
            "Loaded {} bookmark nodes from {}",
            data.nodes.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file after an external edit.
    ///
    /// Holds the tree lock for the whole read so a concurrent mutation can't
    /// be overwritten by an older snapshot. Returns `false` when the file
    /// still holds what this tree last wrote.
    pub fn reload(&self) -> Result<bool, BookmarkError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let mut data = self.lock();
        let fresh = match read_file(path)? {
            Some(content) if content == serde_json::to_string_pretty(&*data)? => {
                debug!("Bookmarks file unchanged, skipping reload");
                return Ok(false);
            }
            Some(content) => serde_json::from_str(&content)?,
            None => TreeData::default(),
        };
        *data = fresh;
        Ok(true)
    }

    /// Create a folder and return its id
    pub fn add_folder(&self, parent_id: &str, title: &str) -> Result<String, BookmarkError> {
        self.mutate(|data| Ok(data.insert(parent_id, title, None)?.id))
    }

    /// Every bookmark (not folder) in tree order
    pub fn bookmarks(&self) -> Vec<BookmarkRecord> {
        self.lock()
            .nodes
            .values()
            .filter(|node| !node.is_folder())
            .map(Node::record)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, TreeData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to a copy of the tree and commit it once it is persisted
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut TreeData) -> Result<T, BookmarkError>,
    ) -> Result<T, BookmarkError> {
        let mut data = self.lock();
        let mut updated = data.clone();
        let result = f(&mut updated)?;

        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(&updated)?;
            write_locked(path, &content).map_err(|source| BookmarkError::Write {
                path: path.clone(),
                source,
            })?;
        }

        *data = updated;
        Ok(result)
    }
}

#[async_trait]
impl BookmarkStore for BookmarkTree {
    async fn search(&self, url: &str) -> Result<Vec<BookmarkRecord>, BookmarkError> {
        Ok(self
            .lock()
            .nodes
            .values()
            .filter(|node| node.url.as_deref() == Some(url))
            .map(Node::record)
            .collect())
    }

    async fn create(
        &self,
        parent_id: Option<&str>,
        title: &str,
        url: &str,
    ) -> Result<BookmarkRecord, BookmarkError> {
        let parent_id = parent_id.unwrap_or(OTHER_BOOKMARKS_ID);
        self.mutate(|data| Ok(data.insert(parent_id, title, Some(url))?.record()))
    }

    async fn update(
        &self,
        id: &str,
        changes: BookmarkChanges,
    ) -> Result<BookmarkRecord, BookmarkError> {
        if TreeData::is_fixed(id) {
            return Err(BookmarkError::RootModification);
        }
        self.mutate(|data| {
            let node = data
                .nodes
                .get_mut(id)
                .ok_or_else(|| BookmarkError::NotFound(id.to_string()))?;

            if let Some(url) = changes.url {
                if node.is_folder() {
                    return Err(BookmarkError::Invalid(
                        "Can't set URL of a bookmark folder".to_string(),
                    ));
                }
                node.url = Some(url);
            }
            if let Some(title) = changes.title {
                node.title = title;
            }
            Ok(node.record())
        })
    }

    async fn move_to(&self, id: &str, parent_id: &str) -> Result<BookmarkRecord, BookmarkError> {
        if TreeData::is_fixed(id) {
            return Err(BookmarkError::RootModification);
        }
        self.mutate(|data| {
            data.folder(parent_id)?;
            if data.is_ancestor(id, parent_id) {
                return Err(BookmarkError::Invalid(
                    "Can't move a folder into itself".to_string(),
                ));
            }

            let mut node = data
                .nodes
                .shift_remove(id)
                .ok_or_else(|| BookmarkError::NotFound(id.to_string()))?;
            node.parent_id = Some(parent_id.to_string());
            let record = node.record();
            data.nodes.insert(node.id.clone(), node);
            Ok(record)
        })
    }

    async fn remove(&self, id: &str) -> Result<(), BookmarkError> {
        if TreeData::is_fixed(id) {
            return Err(BookmarkError::RootModification);
        }
        self.mutate(|data| {
            if data
                .nodes
                .values()
                .any(|node| node.parent_id.as_deref() == Some(id))
            {
                return Err(BookmarkError::Invalid(
                    "Can't remove non-empty folder".to_string(),
                ));
            }
            data.nodes
                .shift_remove(id)
                .map(|_| ())
                .ok_or_else(|| BookmarkError::NotFound(id.to_string()))
        })
    }

    async fn get_tree(&self) -> Result<Vec<BookmarkNode>, BookmarkError> {
        Ok(self.lock().subtree(ROOT_ID).into_iter().collect())
    }
}

fn read_tree(path: &Path) -> Result<TreeData, BookmarkError> {
    match read_file(path)? {
        Some(content) => Ok(serde_json::from_str(&content)?),
        None => Ok(TreeData::default()),
    }
}

fn read_file(path: &Path) -> Result<Option<String>, BookmarkError> {
    read_locked(path).map_err(|source| BookmarkError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_search() {
        let tree = BookmarkTree::in_memory();
        let created = tree
            .create(Some(BOOKMARKS_BAR_ID), "Example", "https://example.com/")
            .await
            .unwrap();

        assert_eq!(created.parent_id, BOOKMARKS_BAR_ID);
        assert!(created.date_added.is_some());

        let found = tree.search("https://example.com/").await.unwrap();
        assert_eq!(found, vec![created]);
        assert!(tree.search("https://example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_defaults_to_other_bookmarks() {
        let tree = BookmarkTree::in_memory();
        let created = tree.create(None, "t", "https://a.test/").await.unwrap();
        assert_eq!(created.parent_id, OTHER_BOOKMARKS_ID);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_or_non_folder_parent() {
        let tree = BookmarkTree::in_memory();
        let err = tree
            .create(Some("404"), "t", "https://a.test/")
            .await
            .unwrap_err();
        assert!(matches!(err, BookmarkError::ParentNotFound(id) if id == "404"));

        let bookmark = tree.create(None, "t", "https://a.test/").await.unwrap();
        let err = tree
            .create(Some(&bookmark.id), "t", "https://b.test/")
            .await
            .unwrap_err();
        assert!(matches!(err, BookmarkError::ParentNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_and_move() {
        let tree = BookmarkTree::in_memory();
        let folder = tree.add_folder(BOOKMARKS_BAR_ID, "Reading").unwrap();
        let bookmark = tree.create(None, "old", "https://a.test/").await.unwrap();

        let updated = tree
            .update(
                &bookmark.id,
                BookmarkChanges {
                    title: Some("new".to_string()),
                    url: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(updated.url, "https://a.test/");

        let moved = tree.move_to(&bookmark.id, &folder).await.unwrap();
        assert_eq!(moved.parent_id, folder);
    }

    #[tokio::test]
    async fn test_missing_bookmark_errors() {
        let tree = BookmarkTree::in_memory();
        assert!(matches!(
            tree.update("99", BookmarkChanges::default()).await,
            Err(BookmarkError::NotFound(_))
        ));
        assert!(matches!(
            tree.move_to("99", OTHER_BOOKMARKS_ID).await,
            Err(BookmarkError::NotFound(_))
        ));
        assert!(matches!(
            tree.remove(ROOT_ID).await,
            Err(BookmarkError::RootModification)
        ));
    }

    #[tokio::test]
    async fn test_folder_cannot_move_into_descendant() {
        let tree = BookmarkTree::in_memory();
        let outer = tree.add_folder(BOOKMARKS_BAR_ID, "outer").unwrap();
        let inner = tree.add_folder(&outer, "inner").unwrap();

        assert!(matches!(
            tree.move_to(&outer, &inner).await,
            Err(BookmarkError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_requires_empty_folder() {
        let tree = BookmarkTree::in_memory();
        let folder = tree.add_folder(BOOKMARKS_BAR_ID, "f").unwrap();
        let bookmark = tree
            .create(Some(&folder), "t", "https://a.test/")
            .await
            .unwrap();

        assert!(tree.remove(&folder).await.is_err());
        tree.remove(&bookmark.id).await.unwrap();
        tree.remove(&folder).await.unwrap();
        assert!(tree.bookmarks().is_empty());
    }

    #[tokio::test]
    async fn test_get_tree_nests_children() {
        let tree = BookmarkTree::in_memory();
        let folder = tree.add_folder(BOOKMARKS_BAR_ID, "News").unwrap();
        tree.create(Some(&folder), "t", "https://a.test/")
            .await
            .unwrap();

        let roots = tree.get_tree().await.unwrap();
        assert_eq!(roots.len(), 1);
        let bar = &roots[0].children.as_ref().unwrap()[0];
        assert_eq!(bar.title, "Bookmarks bar");
        let news = &bar.children.as_ref().unwrap()[0];
        assert_eq!(news.title, "News");
        assert!(news.is_folder());
        assert!(!news.children.as_ref().unwrap()[0].is_folder());
    }

    #[tokio::test]
    async fn test_file_tree_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookmarks.json");

        let tree = BookmarkTree::open(&path).unwrap();
        tree.create(None, "t", "https://a.test/").await.unwrap();

        let reopened = BookmarkTree::open(&path).unwrap();
        assert_eq!(reopened.bookmarks().len(), 1);
        let next = reopened.create(None, "u", "https://b.test/").await.unwrap();
        assert_eq!(next.id, "4");
    }

    #[tokio::test]
    async fn test_reload_skips_own_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookmarks.json");

        let tree = BookmarkTree::open(&path).unwrap();
        tree.create(None, "t", "https://a.test/").await.unwrap();

        assert!(!tree.reload().unwrap());
        assert_eq!(tree.bookmarks().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_picks_up_outside_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookmarks.json");

        let tree = BookmarkTree::open(&path).unwrap();
        let other = BookmarkTree::open(&path).unwrap();
        other.create(None, "t", "https://a.test/").await.unwrap();

        assert!(tree.reload().unwrap());
        assert_eq!(tree.bookmarks()[0].url, "https://a.test/");

        // the reloaded tree keeps allocating after the outside edit
        let next = tree.create(None, "u", "https://b.test/").await.unwrap();
        assert_eq!(next.id, "4");
        assert_eq!(BookmarkTree::open(&path).unwrap().bookmarks().len(), 2);
    }

    #[tokio::test]
    async fn test_folder_move_checks_whole_ancestry() {
        let tree = BookmarkTree::in_memory();
        let outer = tree.add_folder(BOOKMARKS_BAR_ID, "outer").unwrap();
        let middle = tree.add_folder(&outer, "middle").unwrap();
        let inner = tree.add_folder(&middle, "inner").unwrap();

        assert!(matches!(
            tree.move_to(&outer, &inner).await,
            Err(BookmarkError::Invalid(_))
        ));
        let moved = tree.move_to(&inner, &outer).await.unwrap();
        assert_eq!(moved.parent_id, outer);
    }
}
