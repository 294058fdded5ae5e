//! Settings backup and restore
//!
//! A backup is the whole settings namespace serialized as one JSON object.
//! Restoring clears the store and writes the document back key by key.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::settings::{Namespace, SettingsStore, StoreError};

/// File name offered for new backups
pub const DEFAULT_BACKUP_FILE: &str = "smart-bookmark-saver-backup.json";

/// Serialize the whole namespace
pub async fn backup(store: &dyn SettingsStore) -> Result<String, StoreError> {
    let data = store.get_all().await?;
    Ok(serde_json::to_string(&data)?)
}

/// Replace the whole namespace with `document`.
///
/// The document is parsed before anything is cleared, so a malformed
/// backup leaves the store untouched. Returns the number of keys restored.
pub async fn restore(store: &dyn SettingsStore, document: &str) -> Result<usize, StoreError> {
    let data: Namespace = serde_json::from_str(document)?;
    let count = data.len();

    store.clear().await?;
    store.set(data).await?;
    Ok(count)
}

/// Write a backup of `store` to `path`
pub async fn backup_to_file(store: &dyn SettingsStore, path: &Path) -> Result<()> {
    let document = backup(store).await.context("Failed to create settings backup")?;
    std::fs::write(path, document)
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;
    info!("Settings backup written to {}", path.display());
    Ok(())
}

/// Restore `store` from the backup at `path`
pub async fn restore_from_file(store: &dyn SettingsStore, path: &Path) -> Result<usize> {
    let document = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read backup from {}", path.display()))?;
    let count = restore(store, &document)
        .await
        .with_context(|| format!("Unable to restore settings from {}", path.display()))?;
    info!("Restored {} settings keys from {}", count, path.display());
    Ok(count)
}
