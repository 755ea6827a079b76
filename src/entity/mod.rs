// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! State entities: one tree, one definition, one writer at a time.
//!
//! A [`StateEntity`] owns the tree of one configuration domain and is the
//! [`StateAccess`] every transport adapter of that domain is bound to.
//!
//! # Concurrency
//!
//! ```text
//! update() ──► writer mutex (async, one pass at a time)
//!                 │
//!                 ├─► tree write lock ── diff + commit ── released
//!                 │
//!                 └─► dispatcher.notify(items, snapshot)  (still inside the writer)
//! read()   ──► tree read lock ── clone ── released
//! ```
//!
//! Readers see the tree before or after a commit, never in between, and the
//! items of one pass are fully dispatched before the next pass starts.
//!
//! # Example
//!
//! ```
//! use state_sync::{StateEntity, DiffEngine, Origin, UpdateResult};
//! use state_sync::schema::{Definition, PropertyDescriptor};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let definition = Definition::new()
//!     .with(PropertyDescriptor::scalar("effect", 0))
//!     .with(PropertyDescriptor::scalar("projection", 0));
//! let entity = StateEntity::new("effects", definition, DiffEngine::default());
//! entity.populate_defaults().await;
//!
//! let result = entity.update(&json!({"effect": 1, "projection": 0}), &Origin::http()).await.unwrap();
//! assert_eq!(result, UpdateResult::Changed);
//! assert_eq!(entity.read()["effect"], 1);
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::diff::{DiffEngine, UpdateResult, UpdatedItem};
use crate::dispatch::{HandlerId, Origin, StateUpdate, UpdateDispatcher, UpdateHandler};
use crate::error::StateError;
use crate::schema::{fill_missing, populate_defaults, Definition};
use crate::transport::StateAccess;
use crate::tree::empty_tree;

/// Per-domain capability composed into a [`StateEntity`].
///
/// A domain describes its tree and reacts to changed leaves. Reactions run
/// inline in the writer's context: keep them short and push heavy work to a
/// [`WorkQueue`](crate::worker::WorkQueue).
pub trait StateDomain: Send + Sync {
    fn name(&self) -> &str;

    fn describe_schema(&self) -> Definition;

    /// Called once per changed leaf, in diff order.
    fn on_leaf_changed(&self, item: &UpdatedItem, update: &StateUpdate<'_>) {
        debug!(entity = update.entity, item = %item, "no handler for leaf");
    }
}

/// Owner of one configuration domain's tree.
pub struct StateEntity {
    name: String,
    definition: Definition,
    engine: DiffEngine,
    tree: RwLock<Value>,
    /// Serializes diff passes; holds the item list reused by every pass
    writer: Mutex<Vec<UpdatedItem>>,
    dispatcher: UpdateDispatcher,
}

impl StateEntity {
    /// Create an entity with an empty tree.
    ///
    /// Nothing is loaded or defaulted yet; see
    /// [`populate_defaults`](Self::populate_defaults).
    pub fn new(name: impl Into<String>, definition: Definition, engine: DiffEngine) -> Self {
        let name = name.into();
        debug!(entity = %name, properties = definition.len(), "state entity created");
        Self {
            dispatcher: UpdateDispatcher::new(name.clone()),
            name,
            definition,
            engine,
            tree: RwLock::new(empty_tree()),
            writer: Mutex::new(Vec::new()),
        }
    }

    /// Create an entity for `domain` and route every changed leaf to it.
    pub fn for_domain(domain: Arc<dyn StateDomain>, engine: DiffEngine) -> Self {
        let entity = Self::new(domain.name(), domain.describe_schema(), engine);
        entity.dispatcher.register(
            move |update: &StateUpdate<'_>| {
                for item in update.items {
                    domain.on_leaf_changed(item, update);
                }
            },
            false,
        );
        entity
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    #[must_use]
    pub fn dispatcher(&self) -> &UpdateDispatcher {
        &self.dispatcher
    }

    /// Register a handler; shorthand for `dispatcher().register(..)`.
    pub fn on_update<H>(&self, handler: H, skip_self_originated: bool) -> HandlerId
    where
        H: UpdateHandler + 'static,
    {
        self.dispatcher.register(handler, skip_self_originated)
    }

    #[must_use]
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Snapshot of the tree.
    #[must_use]
    pub fn read(&self) -> Value {
        self.tree.read().clone()
    }

    /// Borrow the tree for reading without cloning it.
    pub fn with_tree<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.tree.read())
    }

    /// True while nothing was loaded or defaulted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with_tree(crate::tree::is_empty_document)
    }

    /// Fill an empty tree from the definition. Returns `true` if it did.
    pub async fn populate_defaults(&self) -> bool {
        let _writer = self.writer.lock().await;
        let mut tree = self.tree.write();
        let populated = populate_defaults(&mut tree, &self.definition);
        if populated {
            info!(entity = %self.name, "tree populated from definition");
        } else if crate::tree::is_empty_document(&tree) {
            warn!(entity = %self.name, "tree still empty after defaults");
        }
        populated
    }

    /// Add declared top-level properties the tree lacks, without notifying.
    ///
    /// Returns how many were added.
    pub async fn fill_missing_defaults(&self) -> usize {
        let _writer = self.writer.lock().await;
        let mut tree = self.tree.write();
        let added = fill_missing(&mut tree, &self.definition);
        if !added.is_empty() {
            info!(entity = %self.name, added = ?added, "filled properties missing from tree");
        }
        added.len()
    }

    /// Diff `incoming` into the tree; dispatch on change.
    #[tracing::instrument(skip(self, incoming, origin), fields(entity = %self.name, origin = %origin))]
    pub async fn update(&self, incoming: &Value, origin: &Origin) -> Result<UpdateResult, StateError> {
        let mut items = self.writer.lock().await;

        let (result, snapshot) = {
            let _timer = crate::metrics::LatencyTimer::new(&self.name);
            let mut tree = self.tree.write();
            match self.engine.update(&mut tree, incoming, &mut items) {
                Ok(UpdateResult::Changed) => (UpdateResult::Changed, Some(tree.clone())),
                Ok(UpdateResult::Unchanged) => (UpdateResult::Unchanged, None),
                Err(e) => {
                    warn!(error = %e, "update rejected");
                    crate::metrics::record_update(&self.name, origin.as_str(), "error");
                    return Err(e);
                }
            }
        };

        let label = if result.is_changed() { "changed" } else { "unchanged" };
        crate::metrics::record_update(&self.name, origin.as_str(), label);

        if let Some(tree) = snapshot {
            debug!(items = items.len(), "committed");
            crate::metrics::record_updated_items(&self.name, items.len());
            self.dispatcher.notify(origin, &items, &tree);
        }
        Ok(result)
    }

    /// Replace the whole tree without diffing or notifying.
    pub async fn replace(&self, tree: Value) -> Result<(), StateError> {
        if !tree.is_object() {
            return Err(StateError::InvalidRoot(match tree {
                Value::Array(_) => "array".to_string(),
                _ => "scalar".to_string(),
            }));
        }
        self.engine.check_depth(&tree)?;

        let _writer = self.writer.lock().await;
        *self.tree.write() = tree;
        info!(entity = %self.name, "tree replaced");
        Ok(())
    }

    /// Write one top-level value without diffing or notifying.
    ///
    /// For read-only telemetry that is pushed on its own cadence (running
    /// scripts, uptime) and must not trigger domain reactions. Returns
    /// `true` if the value differed.
    pub async fn set_untracked(&self, key: &str, value: Value) -> bool {
        let _writer = self.writer.lock().await;
        let mut tree = self.tree.write();
        if !tree.is_object() {
            *tree = Value::Object(Map::new());
        }
        let Value::Object(root) = &mut *tree else {
            return false;
        };
        if root.get(key) == Some(&value) {
            return false;
        }
        root.insert(key.to_string(), value);
        true
    }

    /// Dispatch every leaf of the current tree as if it had just been set.
    ///
    /// Used once at boot so observers apply loaded or defaulted values.
    /// The tree is not modified. Returns the number of items dispatched.
    pub async fn replay(&self, origin: &Origin) -> Result<usize, StateError> {
        let mut items = self.writer.lock().await;
        let snapshot = self.tree.read().clone();

        let mut scratch = empty_tree();
        let result = self.engine.update(&mut scratch, &snapshot, &mut items)?;
        if result.is_changed() {
            debug!(entity = %self.name, items = items.len(), "replaying tree");
            self.dispatcher.notify(origin, &items, &snapshot);
        }
        Ok(items.len())
    }
}

impl std::fmt::Debug for StateEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEntity")
            .field("name", &self.name)
            .field("properties", &self.definition.len())
            .field("handlers", &self.dispatcher.len())
            .finish()
    }
}

#[async_trait]
impl StateAccess for StateEntity {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> &Definition {
        StateEntity::definition(self)
    }

    fn read(&self) -> Value {
        StateEntity::read(self)
    }

    async fn update(&self, incoming: &Value, origin: &Origin) -> Result<UpdateResult, StateError> {
        StateEntity::update(self, incoming, origin).await
    }

    async fn replace(&self, tree: Value) -> Result<(), StateError> {
        StateEntity::replace(self, tree).await
    }

    fn add_update_handler(&self, handler: Arc<dyn UpdateHandler>, skip_self_originated: bool) -> HandlerId {
        self.dispatcher.register_shared(handler, skip_self_originated)
    }
}
