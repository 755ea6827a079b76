// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deferred work queue.
//!
//! Update handlers run inside whatever context delivered the write, which
//! may be a request handler with a tight stack. Anything unbounded (script
//! recompiles, peripheral re-initialisation) is submitted here instead and
//! runs on a dedicated task, one job at a time, in submission order.
//!
//! # Example
//!
//! ```
//! use state_sync::worker::WorkQueue;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (queue, handle) = WorkQueue::spawn("compile", 8);
//! let done = Arc::new(AtomicBool::new(false));
//! let flag = done.clone();
//! queue.submit(async move { flag.store(true, Ordering::SeqCst); }).unwrap();
//!
//! drop(queue);
//! handle.await.unwrap();
//! assert!(done.load(Ordering::SeqCst));
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkError {
    #[error("work queue '{0}' is full")]
    QueueFull(String),
    #[error("work queue '{0}' is closed")]
    Closed(String),
}

/// Handle for submitting jobs. Cheap to clone; the worker stops once every
/// handle is dropped and the backlog is drained.
#[derive(Clone)]
pub struct WorkQueue {
    name: String,
    tx: mpsc::Sender<Job>,
}

impl WorkQueue {
    /// Start the worker task and return a handle to it.
    pub fn spawn(name: impl Into<String>, capacity: usize) -> (Self, JoinHandle<()>) {
        let name = name.into();
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

        let worker_name = name.clone();
        let handle = tokio::spawn(async move {
            debug!(queue = %worker_name, "worker started");
            while let Some(job) = rx.recv().await {
                job.await;
                crate::metrics::record_job(&worker_name, "done");
            }
            debug!(queue = %worker_name, "worker stopped");
        });

        (Self { name, tx }, handle)
    }

    /// Queue an async job. Never blocks: a full queue is reported instead.
    pub fn submit<F>(&self, job: F) -> Result<(), WorkError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx.try_send(Box::pin(job)).map_err(|e| {
            let err = match e {
                mpsc::error::TrySendError::Full(_) => WorkError::QueueFull(self.name.clone()),
                mpsc::error::TrySendError::Closed(_) => WorkError::Closed(self.name.clone()),
            };
            warn!(queue = %self.name, error = %err, "job rejected");
            crate::metrics::record_job(&self.name, "rejected");
            err
        })
    }

    /// Queue CPU-heavy synchronous work; it runs on the blocking pool.
    pub fn submit_blocking<F>(&self, job: F) -> Result<(), WorkError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.name.clone();
        self.submit(async move {
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                warn!(queue = %name, error = %e, "blocking job failed");
            }
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("name", &self.name).finish()
    }
}
