// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable-store adapter.
//!
//! # Lifecycle
//!
//! ```text
//! boot:    read_from_store() ── document? ──yes──► replace(tree)   (no diff, no notify)
//!                                    └─no───► caller populates defaults
//!
//! running: Changed pass ──► handler marks dirty ──► writer task ──► write_to_store()
//!          (origin "fs" or "startup" is ignored)      (debounced)     (retried)
//!
//! stop:    flush() writes once more if still dirty
//! ```
//!
//! The handler never touches storage itself: it runs inside the writer's
//! critical section, and a slow medium must not stall other transports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::StateAccess;
use crate::dispatch::{Origin, StateUpdate};
use crate::error::StateError;
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::{DocumentStore, StorageError};
use crate::tree::is_empty_document;

pub struct FsPersistence {
    access: Arc<dyn StateAccess>,
    store: Arc<dyn DocumentStore>,
    key: String,
    dirty: AtomicBool,
    wake: Notify,
}

impl FsPersistence {
    /// Create the adapter and start tracking changes of `access`.
    pub fn new(access: Arc<dyn StateAccess>, store: Arc<dyn DocumentStore>, key: impl Into<String>) -> Arc<Self> {
        let persistence = Arc::new(Self {
            access,
            store,
            key: key.into(),
            dirty: AtomicBool::new(false),
            wake: Notify::new(),
        });

        let weak = Arc::downgrade(&persistence);
        persistence.access.add_update_handler(
            Arc::new(move |update: &StateUpdate<'_>| {
                if update.is_echo(&Origin::fs()) || *update.origin == Origin::startup() {
                    return;
                }
                if let Some(persistence) = weak.upgrade() {
                    persistence.dirty.store(true, Ordering::Release);
                    persistence.wake.notify_one();
                }
            }),
            true,
        );
        persistence
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True while a change has not been written yet.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Load the persisted document and swap it in.
    ///
    /// Returns `Ok(false)` if there is nothing usable to load (never written,
    /// or an empty document); the caller then populates defaults.
    #[tracing::instrument(skip(self), fields(entity = %self.access.name(), key = %self.key))]
    pub async fn read_from_store(&self) -> Result<bool, StateError> {
        let store = &self.store;
        let key = self.key.as_str();
        let loaded = retry("load", &RetryConfig::load(), move || store.load(key)).await;

        let bytes = match loaded {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!("no persisted document");
                crate::metrics::record_persistence(self.access.name(), "load", "missing");
                return Ok(false);
            }
            Err(e) => {
                warn!(error = %e, "load failed");
                crate::metrics::record_persistence(self.access.name(), "load", "error");
                return Err(e.into());
            }
        };

        let tree: Value = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(error = %e, "persisted document is corrupt");
            crate::metrics::record_persistence(self.access.name(), "load", "corrupt");
            StorageError::CorruptDocument {
                key: self.key.clone(),
                reason: e.to_string(),
            }
        })?;

        if is_empty_document(&tree) {
            info!("persisted document is empty");
            crate::metrics::record_persistence(self.access.name(), "load", "missing");
            return Ok(false);
        }

        self.access.replace(tree).await?;
        info!(bytes = bytes.len(), "loaded persisted document");
        crate::metrics::record_persistence(self.access.name(), "load", "ok");
        Ok(true)
    }

    /// Write the current tree, retrying with backoff.
    #[tracing::instrument(skip(self), fields(entity = %self.access.name(), key = %self.key))]
    pub async fn write_to_store(&self) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(&self.access.read())?;

        let store = &self.store;
        let key = self.key.as_str();
        let payload = bytes.as_slice();
        match retry("save", &RetryConfig::save(), move || store.save(key, payload)).await {
            Ok(()) => {
                debug!(bytes = bytes.len(), "persisted");
                crate::metrics::record_persistence(self.access.name(), "save", "ok");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "save failed");
                crate::metrics::record_persistence(self.access.name(), "save", "error");
                Err(e.into())
            }
        }
    }

    /// Write now if a change is pending. Returns `true` if it wrote.
    pub async fn flush(&self) -> Result<bool, StateError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        if let Err(e) = self.write_to_store().await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(true)
    }

    /// Spawn the background writer.
    ///
    /// After a change it waits `debounce` so a burst of updates is written
    /// once, then writes. It stops when `shutdown` turns `true`; pending
    /// changes are left for [`flush`](Self::flush).
    pub fn spawn_writer(self: &Arc<Self>, debounce: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            debug!(entity = %this.access.name(), "persistence writer started");
            loop {
                tokio::select! {
                    _ = this.wake.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                if !debounce.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(debounce) => {}
                        // Pending change is left for flush()
                        _ = shutdown.changed() => break,
                    }
                }
                if let Err(e) = this.flush().await {
                    warn!(entity = %this.access.name(), error = %e, "write-back failed, will retry on next change");
                }
            }
            debug!(entity = %this.access.name(), "persistence writer stopped");
        })
    }
}

impl std::fmt::Debug for FsPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsPersistence")
            .field("entity", &self.access.name())
            .field("key", &self.key)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffEngine;
    use crate::entity::StateEntity;
    use crate::schema::{Definition, PropertyDescriptor};
    use crate::storage::MemoryDocumentStore;
    use serde_json::json;

    const KEY: &str = "config/lights.json";

    fn setup() -> (Arc<StateEntity>, Arc<MemoryDocumentStore>, Arc<FsPersistence>) {
        let definition = Definition::new().with(PropertyDescriptor::scalar("brightness", 10));
        let entity = Arc::new(StateEntity::new("lights", definition, DiffEngine::default()));
        let store = Arc::new(MemoryDocumentStore::new());
        let persistence = FsPersistence::new(entity.clone(), store.clone(), KEY);
        (entity, store, persistence)
    }

    async fn stored(store: &MemoryDocumentStore) -> Option<Value> {
        store
            .load(KEY)
            .await
            .unwrap()
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_document_leaves_defaults_to_caller() {
        let (entity, _store, persistence) = setup();
        assert!(!persistence.read_from_store().await.unwrap());
        assert!(entity.is_empty());
        assert!(entity.populate_defaults().await);
    }

    #[tokio::test]
    async fn test_persisted_document_replaces_tree() {
        let (entity, store, persistence) = setup();
        store.insert_raw(KEY, r#"{"brightness": 42}"#);

        assert!(persistence.read_from_store().await.unwrap());
        assert_eq!(entity.read(), json!({"brightness": 42}));
        assert!(!entity.populate_defaults().await);
        // Loading is not a change
        assert!(!persistence.is_dirty());
    }

    #[tokio::test]
    async fn test_empty_document_counts_as_missing() {
        let (_entity, store, persistence) = setup();
        store.insert_raw(KEY, "{}");
        assert!(!persistence.read_from_store().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_document() {
        let (entity, store, persistence) = setup();
        store.insert_raw(KEY, "{\"brightness\": ");
        let err = persistence.read_from_store().await.unwrap_err();
        assert!(matches!(err, StateError::Storage(StorageError::CorruptDocument { .. })));
        assert!(entity.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_store_fails_after_retries() {
        let (_entity, store, persistence) = setup();
        store.set_offline(true);
        let err = persistence.read_from_store().await.unwrap_err();
        assert!(matches!(err, StateError::Storage(StorageError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_change_marks_dirty_and_flush_writes() {
        let (entity, store, persistence) = setup();
        entity.populate_defaults().await;

        entity.update(&json!({"brightness": 20}), &Origin::http()).await.unwrap();
        assert!(persistence.is_dirty());

        assert!(persistence.flush().await.unwrap());
        assert_eq!(stored(&store).await, Some(json!({"brightness": 20})));
        assert!(!persistence.flush().await.unwrap());
    }

    #[tokio::test]
    async fn test_own_and_startup_origins_ignored() {
        let (entity, _store, persistence) = setup();
        entity.populate_defaults().await;

        entity.update(&json!({"brightness": 30}), &Origin::fs()).await.unwrap();
        entity.replay(&Origin::startup()).await.unwrap();
        assert!(!persistence.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_stays_dirty() {
        let (entity, store, persistence) = setup();
        entity.populate_defaults().await;
        entity.update(&json!({"brightness": 5}), &Origin::http()).await.unwrap();

        store.set_offline(true);
        assert!(persistence.flush().await.is_err());
        assert!(persistence.is_dirty());

        store.set_offline(false);
        assert!(persistence.flush().await.unwrap());
    }

    #[tokio::test]
    async fn test_writer_task_persists_changes() {
        let (entity, store, persistence) = setup();
        entity.populate_defaults().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let writer = persistence.spawn_writer(Duration::ZERO, shutdown_rx);

        entity.update(&json!({"brightness": 77}), &Origin::http()).await.unwrap();

        let mut written = None;
        for _ in 0..100 {
            written = stored(&store).await;
            if written.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(written, Some(json!({"brightness": 77})));

        shutdown_tx.send(true).unwrap();
        writer.await.unwrap();
    }
}
