//! In-process key-value store.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{KeyValueStore, KvError};

/// Volatile store backed by a `HashMap`. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_string(&self, key: &str, default: &str) -> String {
        self.entries
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn save_string(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_key(&self, key: &str) -> Result<(), KvError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn has_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}
