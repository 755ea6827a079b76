// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for state-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `state_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `entity`: configuration domain name (e.g. `animations`)
//! - `origin`: who produced an update (`http`, `fs`, `event:<client>`)
//! - `result`: changed, unchanged, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of one update call
pub fn record_update(entity: &str, origin: &str, result: &str) {
    counter!(
        "state_sync_updates_total",
        "entity" => entity.to_string(),
        "origin" => origin.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record how many leaves one pass changed
pub fn record_updated_items(entity: &str, count: usize) {
    counter!(
        "state_sync_updated_items_total",
        "entity" => entity.to_string()
    )
    .increment(count as u64);
}

/// Record diff + commit latency
pub fn record_update_latency(entity: &str, duration: Duration) {
    histogram!(
        "state_sync_update_seconds",
        "entity" => entity.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record one dispatch and the number of handlers it reached
pub fn record_dispatch(entity: &str, handlers: usize) {
    counter!(
        "state_sync_dispatches_total",
        "entity" => entity.to_string()
    )
    .increment(1);
    histogram!(
        "state_sync_dispatch_handlers",
        "entity" => entity.to_string()
    )
    .record(handlers as f64);
}

/// Record a persistence load/save
pub fn record_persistence(entity: &str, operation: &str, status: &str) {
    counter!(
        "state_sync_persistence_total",
        "entity" => entity.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a push to channel subscribers
pub fn record_push(entity: &str, receivers: usize) {
    counter!(
        "state_sync_pushes_total",
        "entity" => entity.to_string()
    )
    .increment(1);
    gauge!(
        "state_sync_channel_subscribers",
        "entity" => entity.to_string()
    )
    .set(receivers as f64);
}

/// Record a deferred job outcome
pub fn record_job(queue: &str, status: &str) {
    counter!(
        "state_sync_jobs_total",
        "queue" => queue.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set scheduler loop rate (loops per second)
pub fn set_loops_per_second(loops: u64) {
    gauge!("state_sync_scheduler_loops_per_second").set(loops as f64);
}

/// Record a scheduler callback run
pub fn record_scheduled_run(task: &str, duration: Duration) {
    histogram!(
        "state_sync_scheduled_task_seconds",
        "task" => task.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Timer guard that records latency on drop.
pub struct LatencyTimer {
    entity: String,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_update_latency(&self.entity, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_update_counter_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_update("effects", "http", "changed");
            record_update("effects", "http", "changed");
            record_updated_items("effects", 3);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let updates = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "state_sync_updates_total")
            .map(|(_, _, _, value)| value);
        assert_eq!(updates, Some(&DebugValue::Counter(2)));

        let items = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "state_sync_updated_items_total")
            .map(|(_, _, _, value)| value);
        assert_eq!(items, Some(&DebugValue::Counter(3)));
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let _timer = LatencyTimer::new("effects");
        });

        let recorded = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .any(|(key, _, _, _)| key.key().name() == "state_sync_update_seconds");
        assert!(recorded);
    }

    #[test]
    fn test_no_recorder_is_noop() {
        // Without an installed recorder every call is a no-op
        record_push("effects", 2);
        record_job("compile", "ok");
        set_loops_per_second(1000);
    }
}
