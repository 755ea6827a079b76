// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Update dispatch: the append-only observer registry of a state entity.
//!
//! Handlers run inline, in registration order, once per diff pass that
//! reported a change. They must stay fast and bounded; anything heavier is
//! handed to a [`WorkQueue`](crate::worker::WorkQueue).
//!
//! # Example
//!
//! ```
//! use state_sync::dispatch::{Origin, StateUpdate, UpdateDispatcher};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let dispatcher = UpdateDispatcher::new("effects");
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! dispatcher.register(move |update: &StateUpdate<'_>| {
//!     counter.fetch_add(update.items.len(), Ordering::SeqCst);
//! }, false);
//!
//! dispatcher.notify(&Origin::http(), &[], &json!({}));
//! assert_eq!(seen.load(Ordering::SeqCst), 0);
//! assert_eq!(dispatcher.len(), 1);
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::diff::UpdatedItem;

/// Opaque identity of whoever produced an update.
///
/// Handlers compare it against their own identity to suppress echoes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(Arc<str>);

impl Origin {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Request/response endpoint.
    #[must_use]
    pub fn http() -> Self {
        Self::new("http")
    }

    /// One client of a push channel.
    #[must_use]
    pub fn event(client: &str) -> Self {
        Self::new(format!("event:{}", client))
    }

    /// Durable store.
    #[must_use]
    pub fn fs() -> Self {
        Self::new("fs")
    }

    /// Boot-time replay of the loaded tree.
    #[must_use]
    pub fn startup() -> Self {
        Self::new("startup")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a handler receives for one committed diff pass.
#[derive(Debug)]
pub struct StateUpdate<'a> {
    /// Name of the entity whose tree changed
    pub entity: &'a str,
    pub origin: &'a Origin,
    /// Changed leaves of this pass, in visiting order
    pub items: &'a [UpdatedItem],
    /// Post-commit snapshot of the whole tree
    pub tree: &'a Value,
    /// Flag given at registration, passed through untouched
    pub skip_self_originated: bool,
}

impl StateUpdate<'_> {
    /// True if the handler asked to skip its own writes and this is one.
    #[must_use]
    pub fn is_echo(&self, own: &Origin) -> bool {
        self.skip_self_originated && self.origin == own
    }
}

/// Observer of committed changes.
pub trait UpdateHandler: Send + Sync {
    fn on_update(&self, update: &StateUpdate<'_>);
}

impl<F> UpdateHandler for F
where
    F: Fn(&StateUpdate<'_>) + Send + Sync,
{
    fn on_update(&self, update: &StateUpdate<'_>) {
        self(update)
    }
}

/// Position of a handler in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(pub usize);

struct Registration {
    handler: Arc<dyn UpdateHandler>,
    skip_self_originated: bool,
}

/// Append-only registry of update handlers.
pub struct UpdateDispatcher {
    entity: String,
    handlers: RwLock<Vec<Registration>>,
}

impl UpdateDispatcher {
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Append a handler. There is no way to remove it again.
    pub fn register<H>(&self, handler: H, skip_self_originated: bool) -> HandlerId
    where
        H: UpdateHandler + 'static,
    {
        self.register_shared(Arc::new(handler), skip_self_originated)
    }

    /// Append an already shared handler.
    pub fn register_shared(&self, handler: Arc<dyn UpdateHandler>, skip_self_originated: bool) -> HandlerId {
        let mut handlers = self.handlers.write();
        handlers.push(Registration {
            handler,
            skip_self_originated,
        });
        debug!(entity = %self.entity, handlers = handlers.len(), "update handler registered");
        HandlerId(handlers.len() - 1)
    }

    /// Invoke every handler, in registration order.
    ///
    /// The registry lock is released before handlers run, so a handler may
    /// register further handlers; those see the next pass.
    pub fn notify(&self, origin: &Origin, items: &[UpdatedItem], tree: &Value) {
        let snapshot: Vec<(Arc<dyn UpdateHandler>, bool)> = self
            .handlers
            .read()
            .iter()
            .map(|r| (r.handler.clone(), r.skip_self_originated))
            .collect();

        debug!(
            entity = %self.entity,
            origin = %origin,
            items = items.len(),
            handlers = snapshot.len(),
            "dispatching update"
        );
        crate::metrics::record_dispatch(&self.entity, snapshot.len());

        for (handler, skip_self_originated) in snapshot {
            handler.on_update(&StateUpdate {
                entity: &self.entity,
                origin,
                items,
                tree,
                skip_self_originated,
            });
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for UpdateDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateDispatcher")
            .field("entity", &self.entity)
            .field("handlers", &self.len())
            .finish()
    }
}
