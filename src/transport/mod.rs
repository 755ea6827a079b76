// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport adapters and the read/update contract they share.
//!
//! Every adapter is handed the same [`StateAccess`] at construction and
//! only translates between its own representation and the tree:
//!
//! ```text
//!   RequestEndpoint ──┐
//!   EventChannel   ───┼──► StateAccess { read, update } ──► StateEntity ──► DiffEngine
//!   FsPersistence  ───┘                                          │
//!          ▲                                                     ▼
//!          └──────────── re-publish / persist ◄──────── UpdateDispatcher
//! ```
//!
//! Because all three go through one `update`, they cannot disagree about
//! what counts as a change.

pub mod endpoint;
pub mod channel;
pub mod persistence;

pub use endpoint::{EndpointResponse, RequestEndpoint};
pub use channel::{ChannelClient, ChannelEvent, EventChannel};
pub use persistence::FsPersistence;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::diff::UpdateResult;
use crate::dispatch::{HandlerId, Origin, UpdateHandler};
use crate::error::StateError;
use crate::schema::Definition;

/// The read/update pair every adapter is bound to.
#[async_trait]
pub trait StateAccess: Send + Sync {
    /// Name of the configuration domain, used for routes and storage keys.
    fn name(&self) -> &str;

    fn definition(&self) -> &Definition;

    /// Snapshot of the current tree. Never observes a partial commit.
    fn read(&self) -> Value;

    /// Diff `incoming` into the current tree and notify observers on change.
    async fn update(&self, incoming: &Value, origin: &Origin) -> Result<UpdateResult, StateError>;

    /// Swap the whole tree without diffing or notifying (load at boot).
    async fn replace(&self, tree: Value) -> Result<(), StateError>;

    /// Observe committed changes.
    fn add_update_handler(&self, handler: Arc<dyn UpdateHandler>, skip_self_originated: bool) -> HandlerId;
}
