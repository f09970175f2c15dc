//! Key-value persistence seam.
//!
//! Calibration profiles and metric configuration are stored as JSON strings
//! under fixed keys. The engine never assumes a storage medium: hosts inject
//! any [`KeyValueStore`] (the CLI uses SQLite, tests use [`MemoryStore`]).

pub mod file;

pub use file::JsonFileStore;

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Key holding the JSON array of calibration profiles.
pub const CALIBRATION_PROFILES_KEY: &str = "audio_calibration_profiles";
/// Key holding the JSON array of metric configs.
pub const METRIC_CONFIG_KEY: &str = "metricConfig";

/// Contract for persistence backends.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value stored under `key`.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    store.set(key, &json)
}

/// In-memory store, used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_values() {
        let store = MemoryStore::new();
        assert!(store.get("missing").expect("get").is_none());
        store.set("k", "v1").expect("set");
        store.set("k", "v2").expect("overwrite");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k").expect("get").as_deref(), Some("v2"));
        store.delete("k").expect("delete");
        store.delete("k").expect("second delete is a no-op");
        assert!(store.is_empty());
    }

    #[test]
    fn json_helpers_decode_typed_values() {
        let store = MemoryStore::new();
        save_json(&store, "nums", &vec![1, 2, 3]).expect("save");
        let nums: Option<Vec<i32>> = load_json(&store, "nums").expect("load");
        assert_eq!(nums, Some(vec![1, 2, 3]));
    }

    #[test]
    fn corrupt_json_surfaces_serialization_error() {
        let store = MemoryStore::new();
        store.set("bad", "{not json").expect("set");
        let err = load_json::<Vec<i32>>(&store, "bad").unwrap_err();
        assert!(matches!(err, crate::VigorError::Serialization(_)));
    }
}
