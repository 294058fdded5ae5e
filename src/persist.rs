//! Locked reads and writes for the JSON and TOML files smartmark owns

use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::Path;

/// Write `contents` to `path` while holding an exclusive advisory lock on a
/// sibling `.lock` file. Parent directories are created as needed.
pub(crate) fn write_locked(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let lock_file = open_lock(path)?;
    lock_file.lock_exclusive()?;
    let result = std::fs::write(path, contents);
    let _ = lock_file.unlock();

    result
}

/// Read `path` under a shared lock on the same `.lock` file, so a concurrent
/// [`write_locked`] is never observed half-done. `None` if the file is absent.
pub(crate) fn read_locked(path: &Path) -> io::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let lock_file = open_lock(path)?;
    FileExt::lock_shared(&lock_file)?;
    let result = match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    };
    let _ = FileExt::unlock(&lock_file);

    result
}

fn open_lock(path: &Path) -> io::Result<File> {
    let mut lock_name = path.as_os_str().to_owned();
    lock_name.push(".lock");
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(Path::new(&lock_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_locked_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_locked(&path, "{}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(dir.path().join("nested").join("state.json.lock").exists());
    }

    #[test]
    fn test_read_locked_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert_eq!(read_locked(&path).unwrap(), None);
        assert!(!dir.path().join("absent.json.lock").exists());
    }

    #[test]
    fn test_read_locked_sees_last_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_locked(&path, r#"{"a":1}"#).unwrap();
        write_locked(&path, r#"{"a":2}"#).unwrap();

        assert_eq!(read_locked(&path).unwrap().as_deref(), Some(r#"{"a":2}"#));
    }
}
