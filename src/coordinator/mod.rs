// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Composition root.
//!
//! The [`Coordinator`] builds every entity together with its transports,
//! owns the background tasks (persistence writers, scheduler, work queues)
//! and drives startup and shutdown. There are no globals: hosts hold the
//! coordinator and hand out the [`EntityBinding`]s.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Loading → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```
//! use state_sync::{Coordinator, CoordinatorState, StateSyncConfig};
//! use state_sync::storage::MemoryDocumentStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut coordinator = Coordinator::new(StateSyncConfig::default(), Arc::new(MemoryDocumentStore::new()));
//! assert_eq!(coordinator.state(), CoordinatorState::Created);
//!
//! coordinator.start().await.unwrap();
//! assert!(coordinator.is_running());
//!
//! coordinator.shutdown().await;
//! assert_eq!(coordinator.state(), CoordinatorState::Stopped);
//! # }
//! ```

mod types;
mod lifecycle;

pub use types::{CoordinatorState, EntityBinding, LoadOutcome};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::StateSyncConfig;
use crate::diff::DiffEngine;
use crate::entity::{StateDomain, StateEntity};
use crate::scheduler::Scheduler;
use crate::storage::DocumentStore;
use crate::transport::{EventChannel, FsPersistence, RequestEndpoint};
use crate::worker::WorkQueue;

pub struct Coordinator {
    pub(super) config: StateSyncConfig,
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) bindings: Vec<EntityBinding>,

    /// Taken by `start()`; callbacks can only be added before that
    pub(super) scheduler: Option<Scheduler>,

    pub(super) state: watch::Sender<CoordinatorState>,
    pub(super) state_rx: watch::Receiver<CoordinatorState>,
    pub(super) shutdown: watch::Sender<bool>,

    /// Persistence writers and the scheduler loop
    pub(super) tasks: Vec<JoinHandle<()>>,
    pub(super) workers: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Create a coordinator. Nothing runs until [`start()`](Self::start).
    pub fn new(config: StateSyncConfig, store: Arc<dyn DocumentStore>) -> Self {
        let (state_tx, state_rx) = watch::channel(CoordinatorState::Created);
        let (shutdown, _) = watch::channel(false);
        let scheduler = Scheduler::new(Duration::from_millis(config.fast_tick_ms));
        Self {
            config,
            store,
            bindings: Vec::new(),
            scheduler: Some(scheduler),
            state: state_tx,
            state_rx,
            shutdown,
            tasks: Vec::new(),
            workers: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StateSyncConfig {
        &self.config
    }

    /// Diff engine configured from [`StateSyncConfig`].
    #[must_use]
    pub fn diff_engine(&self) -> DiffEngine {
        DiffEngine::new(self.config.max_depth, self.config.shrink_policy)
    }

    /// Build an entity for `domain` and bind all three transports to it.
    pub fn add_domain(&mut self, domain: Arc<dyn StateDomain>) -> EntityBinding {
        let entity = Arc::new(StateEntity::for_domain(domain, self.diff_engine()));
        self.add_entity(entity)
    }

    /// Bind all three transports to an already built entity.
    pub fn add_entity(&mut self, entity: Arc<StateEntity>) -> EntityBinding {
        if self.bindings.iter().any(|b| b.name() == entity.name()) {
            warn!(entity = %entity.name(), "entity name registered twice, routes will collide");
        }
        if self.state() != CoordinatorState::Created {
            warn!(entity = %entity.name(), state = %self.state(), "entity added after start, it will not be loaded");
        }

        let key = self.config.document_key(entity.name());
        let binding = EntityBinding {
            endpoint: Arc::new(RequestEndpoint::new(entity.clone())),
            channel: EventChannel::new(entity.clone(), self.config.channel_capacity),
            persistence: FsPersistence::new(entity.clone(), self.store.clone(), key),
            entity,
        };
        info!(entity = %binding.name(), route = %binding.endpoint.path(), "entity bound");
        self.bindings.push(binding.clone());
        binding
    }

    /// Look up a binding by entity name.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityBinding> {
        self.bindings.iter().find(|b| b.name() == name)
    }

    #[must_use]
    pub fn bindings(&self) -> &[EntityBinding] {
        &self.bindings
    }

    /// Start a deferred work queue owned by this coordinator.
    pub fn spawn_work_queue(&mut self, name: impl Into<String>) -> WorkQueue {
        let (queue, handle) = WorkQueue::spawn(name, self.config.work_queue_capacity);
        self.workers.push(handle);
        queue
    }

    /// Run `task` on the fast cadence (`fast_tick_ms`).
    pub fn every_fast<F>(&mut self, name: &str, task: F) -> &mut Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = Duration::from_millis(self.config.fast_tick_ms);
        self.schedule(name, period, task)
    }

    /// Run `task` on the medium cadence (`medium_tick_ms`).
    pub fn every_medium<F>(&mut self, name: &str, task: F) -> &mut Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = Duration::from_millis(self.config.medium_tick_ms);
        self.schedule(name, period, task)
    }

    /// Run `task` on the slow cadence (`slow_tick_ms`).
    pub fn every_slow<F>(&mut self, name: &str, task: F) -> &mut Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = Duration::from_millis(self.config.slow_tick_ms);
        self.schedule(name, period, task)
    }

    fn schedule<F>(&mut self, name: &str, period: Duration, task: F) -> &mut Self
    where
        F: FnMut() + Send + 'static,
    {
        match self.scheduler.as_mut() {
            Some(scheduler) => {
                scheduler.every(name, period, task);
            }
            None => warn!(task = name, "scheduler already running, callback ignored"),
        }
        self
    }

    /// Get current coordinator state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CoordinatorState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == CoordinatorState::Running
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.bindings.iter().map(EntityBinding::name).collect();
        f.debug_struct("Coordinator")
            .field("state", &self.state())
            .field("entities", &names)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
