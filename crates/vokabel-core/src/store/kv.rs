//! Key-value persistence primitive
//!
//! The entry store and the sync state only need string get/set/remove, which
//! keeps the local store substitutable: an in-memory map for tests, a `SQLite`
//! table for the CLI, or any other durable string store.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// String-keyed, string-valued durable storage.
pub trait KeyValueStore {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, failing with [`Error::CapacityExceeded`] when full
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove a value (missing keys are not an error)
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory store with an optional byte quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    values: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryKeyValueStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses writes once keys plus values exceed `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            values: HashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Change the quota (`None` removes it)
    pub fn set_quota(&mut self, quota_bytes: Option<usize>) {
        self.quota_bytes = quota_bytes;
    }

    /// Bytes currently used by keys and values
    pub fn used_bytes(&self) -> usize {
        self.values
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota_bytes {
            let previous = self
                .values
                .get(key)
                .map_or(0, |existing| key.len() + existing.len());
            let projected = self.used_bytes() - previous + key.len() + value.len();
            if projected > quota {
                return Err(Error::CapacityExceeded(format!(
                    "writing '{key}' needs {projected} bytes, quota is {quota}"
                )));
            }
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}
