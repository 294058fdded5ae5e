//! File watcher for the persisted settings and bookmark files
//!
//! The CLI and other tools edit the same files the daemon serves from, so
//! the daemon watches them and reloads on change.

mod debounce;

use debounce::Debouncer;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Which persisted file changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    Settings,
    Bookmarks,
}

/// Watches individual files by watching their parent directories
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Result<notify::Event, notify::Error>>,
    debouncer: Debouncer,
    targets: HashMap<PathBuf, WatchTarget>,
}

impl FileWatcher {
    /// Create a watcher that coalesces events within `debounce`
    pub fn new(debounce: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to send watch event: {}", e);
                }
            },
            notify::Config::default(),
        )?;

        Ok(Self {
            watcher,
            rx,
            debouncer: Debouncer::new(debounce),
            targets: HashMap::new(),
        })
    }

    /// Start watching `path`; the file does not have to exist yet
    pub fn watch_file(&mut self, path: &Path, target: WatchTarget) -> Result<()> {
        let file_name = path
            .file_name()
            .with_context(|| format!("Not a file path: {}", path.display()))?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let parent = std::fs::canonicalize(&parent).unwrap_or(parent);

        self.watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        self.targets.insert(parent.join(file_name), target);
        info!("Watching {:?} file: {}", target, path.display());
        Ok(())
    }

    /// Drain pending events and return the targets whose files changed and
    /// have since been quiet for the debounce window, each at most once.
    ///
    /// The daemon's own writes show up here too; the stores skip reloads
    /// whose content matches what they last wrote.
    pub fn poll(&mut self) -> Vec<WatchTarget> {
        let now = Instant::now();

        while let Ok(result) = self.rx.try_recv() {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    error!("Watch error: {}", e);
                    continue;
                }
            };
            if !is_content_change(&event.kind) {
                debug!("Ignoring event kind: {:?}", event.kind);
                continue;
            }

            for path in &event.paths {
                if let Some(&target) = self.targets.get(path) {
                    debug!("{:?} file changed: {}", target, path.display());
                    self.debouncer.touch(target, now);
                }
            }
        }

        self.debouncer.settled(now)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_content_change_kinds() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn test_watch_file_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("storage.json");

        let mut watcher = FileWatcher::new(Duration::from_millis(10)).unwrap();
        watcher.watch_file(&path, WatchTarget::Settings).unwrap();

        assert!(dir.path().join("state").is_dir());
        assert!(watcher.poll().is_empty());
    }

    #[test]
    fn test_write_reported_once_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookmarks.json");

        let mut watcher = FileWatcher::new(Duration::from_millis(50)).unwrap();
        watcher.watch_file(&path, WatchTarget::Bookmarks).unwrap();
        std::fs::write(&path, "{}").unwrap();
        std::fs::write(dir.path().join("unrelated.json"), "{}").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut changed = Vec::new();
        while changed.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(60));
            changed = watcher.poll();
        }
        assert_eq!(changed, vec![WatchTarget::Bookmarks]);
    }
}
