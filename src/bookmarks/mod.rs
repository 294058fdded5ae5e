//! Bookmark storage - the records rules create, update and move

mod folders;
mod reconciler;
mod tree;

pub use folders::{Folder, FolderCache, collect_folders, folder_name, search_folders};
pub use reconciler::{ReconcileOutcome, reconcile};
pub use tree::{BOOKMARKS_BAR_ID, BookmarkTree, OTHER_BOOKMARKS_ID, ROOT_ID};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// A bookmark owned by the bookmark store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub url: String,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<i64>,
}

/// A node of the bookmark tree; folders carry `children`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkNode {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    pub fn is_folder(&self) -> bool {
        self.children.is_some()
    }
}

/// Fields to overwrite on an existing bookmark
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkChanges {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("Can't find bookmark for id: {0}")]
    NotFound(String),

    #[error("Can't find parent folder for id: {0}")]
    ParentNotFound(String),

    #[error("Can't modify the root bookmark folders")]
    RootModification,

    #[error("Invalid operation: {0}")]
    Invalid(String),

    #[error("Failed to read bookmarks from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write bookmarks to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed bookmarks document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// External bookmark store
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Bookmarks whose URL equals `url` exactly, in store order
    async fn search(&self, url: &str) -> Result<Vec<BookmarkRecord>, BookmarkError>;

    /// Create a bookmark; `None` picks the store's default folder
    async fn create(
        &self,
        parent_id: Option<&str>,
        title: &str,
        url: &str,
    ) -> Result<BookmarkRecord, BookmarkError>;

    async fn update(
        &self,
        id: &str,
        changes: BookmarkChanges,
    ) -> Result<BookmarkRecord, BookmarkError>;

    async fn move_to(&self, id: &str, parent_id: &str) -> Result<BookmarkRecord, BookmarkError>;

    async fn remove(&self, id: &str) -> Result<(), BookmarkError>;

    /// The whole tree, starting at the root node
    async fn get_tree(&self) -> Result<Vec<BookmarkNode>, BookmarkError>;
}
