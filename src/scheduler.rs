// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cadence-gated periodic work.
//!
//! One loop, a fixed set of callbacks, each with its own period. A callback
//! runs on the first tick and then whenever at least its period has passed
//! since it last ran. Callbacks are synchronous and must stay short: they
//! share the loop with every other cadence.
//!
//! # Example
//!
//! ```
//! use state_sync::scheduler::Scheduler;
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let mut scheduler = Scheduler::new(Duration::from_millis(20));
//! scheduler.every("leds", Duration::from_millis(20), || {});
//! scheduler.every("status", Duration::from_secs(1), || {});
//!
//! let start = Instant::now();
//! assert_eq!(scheduler.run_due(start), 2);
//! assert_eq!(scheduler.run_due(start + Duration::from_millis(20)), 1);
//! ```

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

type Task = Box<dyn FnMut() + Send>;

struct Scheduled {
    name: String,
    period: Duration,
    last_run: Option<Instant>,
    task: Task,
}

pub struct Scheduler {
    tick: Duration,
    tasks: Vec<Scheduled>,
}

impl Scheduler {
    /// `tick` is how often the loop wakes; periods shorter than it are
    /// effectively rounded up to it.
    #[must_use]
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
            tasks: Vec::new(),
        }
    }

    /// Add a callback. Order of registration is order of execution within
    /// one tick.
    pub fn every<F>(&mut self, name: impl Into<String>, period: Duration, task: F) -> &mut Self
    where
        F: FnMut() + Send + 'static,
    {
        self.tasks.push(Scheduled {
            name: name.into(),
            period,
            last_run: None,
            task: Box::new(task),
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every callback that is due at `now`. Returns how many ran.
    pub fn run_due(&mut self, now: Instant) -> usize {
        let mut ran = 0;
        for scheduled in &mut self.tasks {
            let due = match scheduled.last_run {
                None => true,
                Some(last) => now.saturating_duration_since(last) >= scheduled.period,
            };
            if !due {
                continue;
            }
            scheduled.last_run = Some(now);
            let started = std::time::Instant::now();
            (scheduled.task)();
            crate::metrics::record_scheduled_run(&scheduled.name, started.elapsed());
            ran += 1;
        }
        ran
    }

    /// Drive the callbacks until `shutdown` turns `true`.
    ///
    /// Loop iterations per second are published as a gauge.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tasks = self.tasks.len(), tick = ?self.tick, "scheduler running");

        let mut loops: u64 = 0;
        let mut window_start = Instant::now();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    self.run_due(now);
                    loops += 1;
                    if now.saturating_duration_since(window_start) >= Duration::from_secs(1) {
                        crate::metrics::set_loops_per_second(loops);
                        loops = 0;
                        window_start = now;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("scheduler stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|t| t.name.as_str()).collect();
        f.debug_struct("Scheduler")
            .field("tick", &self.tick)
            .field("tasks", &names)
            .finish()
    }
}
