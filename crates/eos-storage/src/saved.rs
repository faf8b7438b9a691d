//! Key-value persistence for user state that outlives a session.
//!
//! The only value stored today is the saved-opportunity set, a JSON array of
//! ids under [`SAVED_KEY`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use eos_core::SavedSet;
use thiserror::Error;
use tracing::warn;

use crate::write_atomic_blocking;

pub const SAVED_KEY: &str = "eos.saved";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not a JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding store value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A single JSON object on disk, rewritten atomically on every `set`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    path: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StoreError::Corrupt { path, source }) => {
                warn!(path = %path.display(), error = %source, "replacing corrupt store file");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        entries.insert(key.to_string(), value.to_string());
        let bytes = serde_json::to_vec_pretty(&entries)?;
        write_atomic_blocking(&self.path, &bytes).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// The visitor's bookmarked opportunity ids.
#[derive(Debug)]
pub struct SavedStore<S> {
    store: S,
}

impl<S: KeyValueStore> SavedStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Missing, unreadable or malformed state all load as the empty set.
    pub fn load(&self) -> SavedSet {
        let raw = match self.store.get(SAVED_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SavedSet::new(),
            Err(err) => {
                warn!(error = %err, "saved set unreadable, starting empty");
                return SavedSet::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => ids.into_iter().filter(|id| !id.is_empty()).collect(),
            Err(err) => {
                warn!(error = %err, "saved set malformed, starting empty");
                SavedSet::new()
            }
        }
    }

    pub fn save(&self, saved: &SavedSet) -> Result<(), StoreError> {
        let ids: Vec<&String> = saved.iter().collect();
        let encoded = serde_json::to_string(&ids)?;
        self.store.set(SAVED_KEY, &encoded)
    }

    /// Flip membership of `id` and persist. Returns whether `id` is now saved.
    pub fn toggle(&self, id: &str) -> Result<bool, StoreError> {
        let mut saved = self.load();
        let now_saved = if saved.remove(id) {
            false
        } else {
            saved.insert(id.to_string());
            true
        };
        self.save(&saved)?;
        Ok(now_saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn toggle_twice_restores_membership() {
        let saved = SavedStore::new(MemoryKeyValueStore::new());
        assert!(saved.load().is_empty());

        assert!(saved.toggle("abc").unwrap());
        assert!(saved.load().contains("abc"));

        assert!(!saved.toggle("abc").unwrap());
        assert!(saved.load().is_empty());
    }

    #[test]
    fn malformed_value_loads_empty() {
        let store = MemoryKeyValueStore::new();
        store.set(SAVED_KEY, "{not json").unwrap();
        let saved = SavedStore::new(store);
        assert!(saved.load().is_empty());

        saved.inner().set(SAVED_KEY, "{\"a\":1}").unwrap();
        assert!(saved.load().is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".eos/saved.json");

        let first = SavedStore::new(FileKeyValueStore::new(&path));
        first.toggle("one").unwrap();
        first.toggle("two").unwrap();

        let reopened = SavedStore::new(FileKeyValueStore::new(&path));
        let ids: Vec<String> = reopened.load().into_iter().collect();
        assert_eq!(ids, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_replaced_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.json");
        std::fs::write(&path, "garbage").unwrap();

        let saved = SavedStore::new(FileKeyValueStore::new(&path));
        assert!(saved.load().is_empty());
        assert!(saved.toggle("x").unwrap());
        assert!(saved.load().contains("x"));

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get(SAVED_KEY).map(String::as_str), Some("[\"x\"]"));
    }
}
