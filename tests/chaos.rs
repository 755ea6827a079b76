//! Chaos Testing for State Sync
//!
//! This module tests failure scenarios using:
//! 1. **FailingStore wrapper** - precise error injection at specific call counts
//! 2. **Data corruption** - garbage documents in the store
//! 3. **Concurrent writers** - every transport hammering one entity at once
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use state_sync::{
    Coordinator, DiffEngine, DocumentStore, LoadOutcome, MemoryDocumentStore, Origin, StateEntity,
    StateSyncConfig, StorageError, UpdateResult,
};
use state_sync::schema::{Definition, PropertyDescriptor};

// =============================================================================
// Failing Store Wrapper - Precise Error Injection
// =============================================================================

/// A wrapper that injects failures at specific call numbers.
pub struct FailingStore<S: DocumentStore> {
    inner: S,
    load_calls: AtomicU64,
    save_calls: AtomicU64,
    /// Fail on these load call numbers (1-indexed)
    fail_loads: Vec<u64>,
    /// Fail on these save call numbers (1-indexed)
    fail_saves: Vec<u64>,
}

impl<S: DocumentStore> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            load_calls: AtomicU64::new(0),
            save_calls: AtomicU64::new(0),
            fail_loads: Vec::new(),
            fail_saves: Vec::new(),
        }
    }

    pub fn fail_loads(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.fail_loads = calls.into_iter().collect();
        self
    }

    pub fn fail_saves(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.fail_saves = calls.into_iter().collect();
        self
    }

    pub fn save_calls(&self) -> u64 {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for FailingStore<S> {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let call = self.load_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_loads.contains(&call) {
            return Err(StorageError::StorageUnavailable(format!("injected load failure #{}", call)));
        }
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let call = self.save_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_saves.contains(&call) {
            return Err(StorageError::StorageUnavailable(format!("injected save failure #{}", call)));
        }
        self.inner.save(key, bytes).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

fn lights() -> Arc<StateEntity> {
    let definition = Definition::new()
        .with(PropertyDescriptor::scalar("brightness", 10))
        .with(PropertyDescriptor::scalar("lightsOn", true));
    Arc::new(StateEntity::new("lights", definition, DiffEngine::default()))
}

async fn saved(store: &dyn DocumentStore, key: &str) -> Option<Value> {
    store
        .load(key)
        .await
        .unwrap()
        .map(|bytes| serde_json::from_slice(&bytes).unwrap())
}

// =============================================================================
// Storage Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn chaos_transient_load_failures_are_retried() {
    let inner = MemoryDocumentStore::new();
    inner.insert_raw("config/lights.json", r#"{"brightness": 200, "lightsOn": false}"#);
    let store = Arc::new(FailingStore::new(inner).fail_loads([1, 2]));

    let mut coordinator = Coordinator::new(StateSyncConfig::default(), store);
    let lights = coordinator.add_entity(lights());

    let outcomes = coordinator.start().await.unwrap();
    assert_eq!(outcomes[0].1, LoadOutcome::Loaded);
    assert_eq!(lights.entity.read(), json!({"brightness": 200, "lightsOn": false}));
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn chaos_store_down_at_boot_falls_back_to_defaults() {
    let store = Arc::new(FailingStore::new(MemoryDocumentStore::new()).fail_loads(1..=10));

    let mut coordinator = Coordinator::new(StateSyncConfig::default(), store.clone());
    let lights = coordinator.add_entity(lights());

    let outcomes = coordinator.start().await.unwrap();
    assert_eq!(outcomes[0].1, LoadOutcome::Recovered);
    assert_eq!(lights.entity.read(), json!({"brightness": 10, "lightsOn": true}));

    // Writes still go through once something changes
    lights.entity.update(&json!({"brightness": 11, "lightsOn": true}), &Origin::http()).await.unwrap();
    coordinator.shutdown().await;
    assert!(store.save_calls() >= 1);
}

#[tokio::test(start_paused = true)]
async fn chaos_transient_save_failures_are_retried() {
    let store = Arc::new(FailingStore::new(MemoryDocumentStore::new()).fail_saves([1, 2, 3]));

    let mut coordinator = Coordinator::new(StateSyncConfig::default(), store.clone());
    let lights = coordinator.add_entity(lights());
    coordinator.start().await.unwrap();

    lights.entity.update(&json!({"brightness": 50, "lightsOn": true}), &Origin::http()).await.unwrap();
    // Let the writer run through its backoff
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(!lights.persistence.is_dirty());
    assert_eq!(store.save_calls(), 4);
    assert_eq!(saved(store.as_ref(), "config/lights.json").await, Some(json!({"brightness": 50, "lightsOn": true})));
    coordinator.shutdown().await;
}

#[tokio::test]
async fn chaos_corrupt_document_is_replaced_on_next_change() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert_raw("config/lights.json", b"\x00\xffnot json at all".to_vec());

    let mut coordinator = Coordinator::new(StateSyncConfig::default(), store.clone());
    let lights = coordinator.add_entity(lights());

    let outcomes = coordinator.start().await.unwrap();
    assert_eq!(outcomes[0].1, LoadOutcome::Recovered);
    assert_eq!(lights.entity.read()["brightness"], 10);

    lights.entity.update(&json!({"brightness": 12, "lightsOn": true}), &Origin::http()).await.unwrap();
    coordinator.shutdown().await;
    assert_eq!(saved(store.as_ref(), "config/lights.json").await, Some(json!({"brightness": 12, "lightsOn": true})));
}

#[tokio::test]
async fn chaos_truncated_document_counts_as_missing() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert_raw("config/lights.json", "null");

    let mut coordinator = Coordinator::new(StateSyncConfig::default(), store);
    let lights = coordinator.add_entity(lights());

    let outcomes = coordinator.start().await.unwrap();
    assert_eq!(outcomes[0].1, LoadOutcome::Defaulted);
    assert_eq!(lights.entity.read()["lightsOn"], true);
    coordinator.shutdown().await;
}

// =============================================================================
// Concurrent Writers
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_all_transports_at_once() {
    let config = StateSyncConfig {
        channel_capacity: 1024,
        ..Default::default()
    };
    let store = Arc::new(MemoryDocumentStore::new());
    let mut coordinator = Coordinator::new(config, store.clone());
    let lights = coordinator.add_entity(lights());
    coordinator.start().await.unwrap();
    let mut observer = lights.channel.connect();

    let mut handles = Vec::new();
    for n in 0..50u64 {
        let lights = lights.clone();
        handles.push(tokio::spawn(async move {
            let body = json!({"brightness": n + 100, "lightsOn": n % 2 == 0});
            if n % 2 == 0 {
                let reply = lights.endpoint.post_json(body).await;
                assert_eq!(reply.status, 200);
                UpdateResult::Changed
            } else {
                let client = lights.channel.connect();
                lights
                    .channel
                    .receive(client.id(), &serde_json::to_vec(&body).unwrap())
                    .await
                    .unwrap()
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every push carries a whole, consistent tree; the last one is the final state
    let mut last = None;
    while let Some(event) = observer.try_recv() {
        let brightness = event.payload["brightness"].as_u64().unwrap();
        assert_eq!(event.payload["lightsOn"], json!((brightness - 100) % 2 == 0));
        last = Some(event.payload);
    }
    assert_eq!(last, Some(lights.entity.read()));

    coordinator.shutdown().await;
    assert_eq!(saved(store.as_ref(), "config/lights.json").await, Some(lights.entity.read()));
}
