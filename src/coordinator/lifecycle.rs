//! Coordinator lifecycle: start and shutdown.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dispatch::Origin;
use crate::error::StateError;

use super::{Coordinator, CoordinatorState, EntityBinding, LoadOutcome};

/// How long shutdown waits for work queues to drain before abandoning them.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

impl Coordinator {
    /// Load every entity and start the background tasks.
    ///
    /// Per entity, in registration order:
    /// 1. Load the persisted document; if present it replaces the tree and
    ///    declared properties it lacks get their defaults
    /// 2. Otherwise (or if the store fails) populate defaults
    /// 3. Replay the tree to observers with the `startup` origin
    ///
    /// Then one persistence writer per entity and the scheduler are spawned.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<Vec<(String, LoadOutcome)>, StateError> {
        let startup_start = std::time::Instant::now();
        info!(entities = self.bindings.len(), "Starting state sync coordinator");
        let _ = self.state.send(CoordinatorState::Loading);

        let mut outcomes = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let outcome = load_entity(binding).await;
            let replayed = binding.entity.replay(&Origin::startup()).await?;
            info!(entity = %binding.name(), outcome = %outcome, replayed, "entity ready");
            outcomes.push((binding.name().to_string(), outcome));
        }

        let debounce = self.config.persist_debounce();
        for binding in &self.bindings {
            let writer = binding.persistence.spawn_writer(debounce, self.shutdown.subscribe());
            self.tasks.push(writer);
        }

        if let Some(scheduler) = self.scheduler.take() {
            if !scheduler.is_empty() {
                self.tasks.push(tokio::spawn(scheduler.run(self.shutdown.subscribe())));
            }
        }

        let _ = self.state.send(CoordinatorState::Running);
        info!(elapsed = ?startup_start.elapsed(), "State sync coordinator running");
        Ok(outcomes)
    }

    /// Stop background tasks and write back anything still pending.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&mut self) {
        info!("Initiating state sync shutdown...");
        let _ = self.state.send(CoordinatorState::ShuttingDown);
        let _ = self.shutdown.send(true);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        for binding in &self.bindings {
            match binding.persistence.flush().await {
                Ok(true) => debug!(entity = %binding.name(), "flushed on shutdown"),
                Ok(false) => {}
                Err(e) => warn!(entity = %binding.name(), error = %e, "final flush failed, last change is lost"),
            }
        }

        for worker in self.workers.drain(..) {
            let abort = worker.abort_handle();
            if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker).await.is_err() {
                warn!("work queue still busy, abandoning it");
                abort.abort();
            }
        }

        let _ = self.state.send(CoordinatorState::Stopped);
        info!("State sync shutdown complete");
    }
}

async fn load_entity(binding: &EntityBinding) -> LoadOutcome {
    match binding.persistence.read_from_store().await {
        Ok(true) => {
            binding.entity.fill_missing_defaults().await;
            LoadOutcome::Loaded
        }
        Ok(false) => {
            binding.entity.populate_defaults().await;
            LoadOutcome::Defaulted
        }
        Err(e) => {
            warn!(entity = %binding.name(), error = %e, "could not load persisted document, using defaults");
            binding.entity.populate_defaults().await;
            LoadOutcome::Recovered
        }
    }
}
