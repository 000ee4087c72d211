//! Key-value persistence for state that must survive restarts.
//!
//! Only the session token is persisted today (see [`crate::session`]).
//! [`FileStore`] keeps entries in a small TOML file under the user's config
//! directory; [`MemoryStore`] is for tests and ephemeral sessions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad storage file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("can't serialize storage: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A string-keyed store. Implementations use interior mutability so a store
/// can be shared behind `Arc`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// TOML-file backed store. The file is read once on open and rewritten on
/// every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    /// The file on disk could not be parsed; the next change rewrites it.
    discarded: AtomicBool,
}

impl FileStore {
    /// `~/.config/blueprint/session.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blueprint")
            .join("session.toml")
    }

    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let s = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            toml::from_str(&s).map_err(|source| StorageError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            discarded: AtomicBool::new(false),
        })
    }

    /// Like [`FileStore::open`], but a file that is not valid TOML is
    /// treated as empty instead of failing. The bad file stays on disk until
    /// the next `set` or `remove` replaces or deletes it.
    pub fn open_or_reset(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        match Self::open(path) {
            Err(StorageError::Parse { path, source }) => {
                tracing::warn!("Discarding unreadable storage file {}: {source}", path.display());
                Ok(Self {
                    path,
                    entries: Mutex::new(BTreeMap::new()),
                    discarded: AtomicBool::new(true),
                })
            }
            other => other,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).map_err(io_err)?;
            }
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let s = toml::to_string_pretty(entries)?;
        std::fs::write(&self.path, s).map_err(io_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)?;
        self.discarded.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() && !self.discarded.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.flush(&entries)?;
        self.discarded.store(false, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("token").unwrap(), None);
        store.set("token", "abc").unwrap();
        assert_eq!(store.get("token").unwrap().as_deref(), Some("abc"));
        store.remove("token").unwrap();
        store.remove("token").unwrap();
        assert_eq!(store.get("token").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.toml");

        let store = FileStore::open(&path).unwrap();
        store.set("token", "abc.def.ghi").unwrap();
        assert!(path.exists());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc.def.ghi"));

        reopened.remove("token").unwrap();
        assert!(!path.exists());
        assert_eq!(FileStore::open(&path).unwrap().get("token").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(FileStore::open(&path), Err(StorageError::Parse { .. })));
    }

    #[test]
    fn test_file_store_resets_garbage_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let store = FileStore::open_or_reset(&path).unwrap();
        assert_eq!(store.get("token").unwrap(), None);
        // Reading alone leaves the file untouched.
        assert!(path.exists());

        store.set("token", "abc.def.ghi").unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_file_store_resets_garbage_on_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "token = [").unwrap();

        let store = FileStore::open_or_reset(&path).unwrap();
        store.remove("token").unwrap();
        assert!(!path.exists());
        store.remove("token").unwrap();

        let missing = dir.path().join("missing.toml");
        let fresh = FileStore::open_or_reset(&missing).unwrap();
        fresh.remove("token").unwrap();
        assert!(!missing.exists());
    }
}
