//! String key/value storage shared by every surface.
//!
//! This is the storage medium behind conversations and PIN flags. Two
//! backings are provided:
//!
//! - [`MemoryBlobStore`] - process-local map, used by tests and demos
//! - [`FileBlobStore`] - one file per key under a data directory, so separate
//!   processes (user chat, agent console) see each other's writes
//!
//! # Design Notes
//!
//! - **Atomic writes**: Write to a uniquely named temp file in the same
//!   directory, then rename it over `{key}.json`
//! - **No locking**: Concurrent writers race; the last rename wins

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Minimal string storage contract, modelled on browser local storage.
pub trait BlobStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing whatever was there.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

// ============================================================================
// File-backed
// ============================================================================

/// Stores each key as `{dir}/{key}.json`.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

/// Reject empty keys and anything that is not a single normal path component.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }

    let mut components = Path::new(key).components();
    match components.next() {
        Some(Component::Normal(_)) if components.next().is_none() => Ok(()),
        _ => Err(StoreError::InvalidKey(key.to_string())),
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    mod memory {
        use super::*;

        #[test]
        fn set_get_remove() {
            let store = MemoryBlobStore::new();
            assert_eq!(store.get("k").unwrap(), None);

            store.set("k", "v1").unwrap();
            store.set("k", "v2").unwrap();
            assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

            store.remove("k").unwrap();
            store.remove("k").unwrap();
            assert_eq!(store.get("k").unwrap(), None);
        }
    }

    mod file {
        use super::*;

        #[test]
        fn set_then_get_from_another_handle() {
            let dir = tempdir().unwrap();
            FileBlobStore::new(dir.path()).set("chats", "[]").unwrap();

            let other = FileBlobStore::new(dir.path());
            assert_eq!(other.get("chats").unwrap().as_deref(), Some("[]"));
        }

        #[test]
        fn missing_key_is_none() {
            let dir = tempdir().unwrap();
            let store = FileBlobStore::new(dir.path().join("not-created-yet"));
            assert_eq!(store.get("anything").unwrap(), None);
        }

        #[test]
        fn atomic_write_leaves_no_temp_file() {
            let dir = tempdir().unwrap();
            let store = FileBlobStore::new(dir.path());
            store.set("flag", "true").unwrap();

            let names: Vec<_> = fs::read_dir(dir.path())
                .unwrap()
                .map(|entry| entry.unwrap().file_name())
                .collect();
            assert_eq!(names, vec![std::ffi::OsString::from("flag.json")]);
        }

        #[test]
        fn concurrent_writers_on_one_key_all_succeed() {
            let dir = tempdir().unwrap();
            let writers: Vec<_> = ["serve", "chat"]
                .into_iter()
                .map(|name| {
                    let store = FileBlobStore::new(dir.path());
                    std::thread::spawn(move || {
                        (0..300)
                            .filter(|i| {
                                store
                                    .set("customer_support_chats", &format!("{name}-{i}"))
                                    .is_err()
                            })
                            .count()
                    })
                })
                .collect();

            for writer in writers {
                assert_eq!(writer.join().unwrap(), 0);
            }
            let last = FileBlobStore::new(dir.path())
                .get("customer_support_chats")
                .unwrap()
                .unwrap();
            assert!(last == "serve-299" || last == "chat-299");
        }

        #[test]
        fn remove_deletes_file() {
            let dir = tempdir().unwrap();
            let store = FileBlobStore::new(dir.path());
            store.set("flag", "true").unwrap();
            store.remove("flag").unwrap();

            assert!(!dir.path().join("flag.json").exists());
            assert!(store.remove("flag").is_ok());
        }

        #[test]
        fn rejects_path_traversal_keys() {
            let dir = tempdir().unwrap();
            let store = FileBlobStore::new(dir.path());

            for key in ["", "../escape", "a/b", "/abs"] {
                assert!(
                    matches!(store.set(key, "x"), Err(StoreError::InvalidKey(_))),
                    "key {key:?} should be rejected"
                );
            }
        }
    }
}
