//! services/client/src/adapters/storage.rs
//!
//! Local-storage adapters implementing the `LocalStore` port: an in-memory
//! map for tests and transient embedding hosts, and a JSON file for
//! desktop-style persistence across runs.
//!
//! Both honor the shared-resource policy: another writer may touch the
//! medium between calls, so `get` re-reads the backing store every time and
//! last write wins.

use java_tutor_core::ports::{LocalStore, PortError, PortResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

//=========================================================================================
// MemoryStore
//=========================================================================================

/// A process-local `LocalStore` backed by a mutexed map.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        self.map.lock().unwrap().remove(key);
        Ok(())
    }
}

//=========================================================================================
// JsonFileStore
//=========================================================================================

/// A `LocalStore` persisted as one JSON object in a file. Every operation
/// re-reads the file, so concurrent writers (another process of the same
/// profile) are observed rather than clobbered blindly.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> PortResult<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| PortError::Unexpected(format!("corrupt store file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> PortResult<()> {
        let raw = serde_json::to_string(map).map_err(|e| PortError::Unexpected(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

impl LocalStore for JsonFileStore {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
