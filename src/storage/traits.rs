use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Corrupt document '{key}': {reason}")]
    CorruptDocument { key: String, reason: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Durable home for whole documents, one per key.
///
/// Documents are opaque bytes here; the persistence adapter owns encoding.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document. `Ok(None)` means it was never written.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the document at `key`.
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.load(key).await?.is_some())
    }
}
