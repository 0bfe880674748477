/**
 * STATE STORE - Persistence of merged device and room states
 *
 * ROLE: the `load` / `save` collaborator used by the ingest pipeline to obtain
 * the base state of an entity and persist the merged one.
 *
 * IMPLEMENTATIONS:
 * - MemoryStore: process-local map (tests, ephemeral runs)
 * - JsonFileStore: one JSON document per entity kind, cached in memory and
 *   rewritten on every save
 *
 * The store never merges: it keeps whatever the pipeline hands it.
 */

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed storage for one entity kind.
pub trait StateStore<T>: Send + Sync {
    /// Returns `None` when the entity has never been saved.
    fn load(&self, id: &str) -> Result<Option<T>, StoreError>;

    fn save(&self, id: &str, state: &T) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<T>, StoreError>;

    fn count(&self) -> usize;
}

pub struct MemoryStore<T> {
    entries: Mutex<BTreeMap<String, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(BTreeMap::new()) }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> StateStore<T> for MemoryStore<T> {
    fn load(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.entries.lock().get(id).cloned())
    }

    fn save(&self, id: &str, state: &T) -> Result<(), StoreError> {
        self.entries.lock().insert(id.to_string(), state.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.entries.lock().values().cloned().collect())
    }

    fn count(&self) -> usize {
        self.entries.lock().len()
    }
}

/// JSON file backed store, `{ "<id>": <state>, ... }`.
pub struct JsonFileStore<T> {
    storage_path: PathBuf,
    cache: Mutex<BTreeMap<String, T>>,
}

impl<T: Serialize + DeserializeOwned + Clone + Send> JsonFileStore<T> {
    /// Opens the store, creating an empty document when the file does not exist.
    pub fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let storage_path = storage_path.into();
        if !storage_path.exists() {
            if let Some(parent) = storage_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&storage_path, "{}")?;
        }

        let content = fs::read_to_string(&storage_path)?;
        let entries: BTreeMap<String, T> = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content)?
        };

        info!(path = %storage_path.display(), entries = entries.len(), "state store opened");
        Ok(Self { storage_path, cache: Mutex::new(entries) })
    }

    fn save_to_disk(&self, entries: &BTreeMap<String, T>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.storage_path, json)?;
        Ok(())
    }
}

impl<T: Serialize + DeserializeOwned + Clone + Send> StateStore<T> for JsonFileStore<T> {
    fn load(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.cache.lock().get(id).cloned())
    }

    fn save(&self, id: &str, state: &T) -> Result<(), StoreError> {
        // lock held across the write so concurrent saves hit the disk in order;
        // the cache only takes the new state once the file has it
        let mut cache = self.cache.lock();
        let mut next = cache.clone();
        next.insert(id.to_string(), state.clone());
        self.save_to_disk(&next)?;
        *cache = next;
        debug!(id, path = %self.storage_path.display(), "state persisted");
        Ok(())
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.cache.lock().values().cloned().collect())
    }

    fn count(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceState, RoomState};

    #[test]
    fn test_memory_store_load_missing() {
        let store: MemoryStore<DeviceState> = MemoryStore::new();
        assert!(store.load("nope").unwrap().is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_memory_store_save_and_list() {
        let store: MemoryStore<RoomState> = MemoryStore::new();
        store.save("ITB-1101", &RoomState::new("ITB-1101")).unwrap();
        store.save("ITB-1102", &RoomState::new("ITB-1102")).unwrap();

        assert_eq!(store.load("ITB-1101").unwrap().unwrap().room_id, "ITB-1101");
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");

        let mut state = DeviceState::new("ITB-1101-D1");
        state.display.power = "on".into();
        {
            let store: JsonFileStore<DeviceState> = JsonFileStore::open(&path).unwrap();
            store.save("ITB-1101-D1", &state).unwrap();
        }

        let reopened: JsonFileStore<DeviceState> = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.load("ITB-1101-D1").unwrap(), Some(state));
        assert_eq!(reopened.count(), 1);
    }

    #[test]
    fn test_json_store_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rooms.json");

        let store: JsonFileStore<RoomState> = JsonFileStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_json_store_failed_write_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let store: JsonFileStore<DeviceState> = JsonFileStore::open(&path).unwrap();

        let mut first = DeviceState::new("ITB-1101-D1");
        first.display.power = "standby".into();
        store.save("ITB-1101-D1", &first).unwrap();

        // a directory in place of the file makes every write fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let mut second = first.clone();
        second.display.power = "on".into();
        assert!(matches!(store.save("ITB-1101-D1", &second), Err(StoreError::Io(_))));
        assert!(matches!(store.save("ITB-1101-D2", &second), Err(StoreError::Io(_))));

        assert_eq!(store.load("ITB-1101-D1").unwrap(), Some(first));
        assert!(store.load("ITB-1101-D2").unwrap().is_none());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        fs::write(&path, "not json").unwrap();

        let result: Result<JsonFileStore<DeviceState>, _> = JsonFileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
