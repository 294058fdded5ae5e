//! JSON-backed settings store

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{Namespace, SettingsStore, StorageChange, StoreError};
use crate::persist::{read_locked, write_locked};

/// Capacity of the change-notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Settings store kept in memory and, when opened from a path, mirrored
/// to a JSON file after every write.
///
/// Individual `get`/`set`/`clear` calls are serialized by an internal lock.
pub struct JsonStore {
    path: Option<PathBuf>,
    data: Mutex<Namespace>,
    changes: broadcast::Sender<StorageChange>,
}

impl JsonStore {
    /// Create an empty store that is never written to disk
    pub fn in_memory() -> Self {
        Self::with_data(Namespace::new())
    }

    /// Create an in-memory store seeded with `data`
    pub fn with_data(data: Namespace) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: None,
            data: Mutex::new(data),
            changes,
        }
    }

    /// Open a file-backed store; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = read_namespace(&path)?;
        debug!("Loaded {} settings keys from {}", data.len(), path.display());

        let mut store = Self::with_data(data);
        store.path = Some(path);
        Ok(store)
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file after an external edit and notify
    /// subscribers about every key that differs.
    ///
    /// The store lock is held across the read, so a `set` racing with the
    /// reload is never rolled back by an older snapshot.
    pub fn reload(&self) -> Result<usize, StoreError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };

        let mut data = self.lock();
        let content = read_file(path)?;
        if let Some(content) = &content
            && *content == serde_json::to_string_pretty(&*data)?
        {
            debug!("Settings file unchanged, skipping reload");
            return Ok(0);
        }
        let fresh = parse_namespace(path, content.as_deref())?;

        let mut changes = Vec::new();
        for (key, old) in data.iter() {
            if !fresh.contains_key(key) {
                changes.push(StorageChange {
                    key: key.clone(),
                    old_value: Some(old.clone()),
                    new_value: None,
                });
            }
        }
        for (key, new) in &fresh {
            let old = data.get(key);
            if old != Some(new) {
                changes.push(StorageChange {
                    key: key.clone(),
                    old_value: old.cloned(),
                    new_value: Some(new.clone()),
                });
            }
        }
        *data = fresh;
        drop(data);

        let count = changes.len();
        self.broadcast(changes);
        Ok(count)
    }

    fn lock(&self) -> MutexGuard<'_, Namespace> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &Namespace) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(data)?;
        write_locked(path, &content).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })
    }

    fn broadcast(&self, changes: Vec<StorageChange>) {
        for change in changes {
            // No subscribers is not an error
            let _ = self.changes.send(change);
        }
    }
}

#[async_trait]
impl SettingsStore for JsonStore {
    async fn get(&self, keys: &[&str]) -> Result<Namespace, StoreError> {
        let data = self.lock();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn get_all(&self) -> Result<Namespace, StoreError> {
        Ok(self.lock().clone())
    }

    async fn set(&self, items: Namespace) -> Result<(), StoreError> {
        let mut data = self.lock();
        let mut updated = data.clone();
        let mut changes = Vec::new();

        for (key, value) in items {
            let old = updated.insert(key.clone(), value.clone());
            if old.as_ref() != Some(&value) {
                changes.push(StorageChange {
                    key,
                    old_value: old,
                    new_value: Some(value),
                });
            }
        }

        self.persist(&updated)?;
        *data = updated;
        drop(data);

        self.broadcast(changes);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut data = self.lock();
        self.persist(&Namespace::new())?;

        let changes = data
            .drain(..)
            .map(|(key, old)| StorageChange {
                key,
                old_value: Some(old),
                new_value: None,
            })
            .collect();
        drop(data);

        self.broadcast(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

fn read_namespace(path: &Path) -> Result<Namespace, StoreError> {
    let content = read_file(path)?;
    parse_namespace(path, content.as_deref())
}

fn read_file(path: &Path) -> Result<Option<String>, StoreError> {
    read_locked(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_namespace(path: &Path, content: Option<&str>) -> Result<Namespace, StoreError> {
    let Some(content) = content else {
        return Ok(Namespace::new());
    };
    if content.trim().is_empty() {
        warn!("Settings file {} is empty, starting fresh", path.display());
        return Ok(Namespace::new());
    }

    Ok(serde_json::from_str(content)?)
}
