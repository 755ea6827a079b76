use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use super::traits::{DocumentStore, StorageError};

/// Volatile document store, for tests and devices without a filesystem.
pub struct MemoryDocumentStore {
    data: DashMap<String, Vec<u8>>,
    /// When set, every operation fails as if the medium were gone
    offline: AtomicBool,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            offline: AtomicBool::new(false),
        }
    }

    /// Get current document count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Simulate the medium disappearing (or coming back)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Seed a raw document, bypassing the offline switch
    pub fn insert_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.data.insert(key.to_string(), bytes.into());
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(StorageError::StorageUnavailable("memory store offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_online()?;
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.check_online()?;
        self.data.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_online()?;
        self.data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.check_online()?;
        Ok(self.data.contains_key(key))
    }
}
