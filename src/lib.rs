// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # State Sync
//!
//! Hierarchical JSON state trees kept consistent across several transports.
//!
//! ## Architecture
//!
//! Each configuration domain (lights, effects, drivers, ...) is a
//! [`StateEntity`]: one tree, one schema [`Definition`], one writer at a time.
//! Every transport reads and writes through the same [`StateAccess`], so a
//! change made over one of them reaches all the others.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Transports                            │
//! │  RequestEndpoint (GET/POST)  EventChannel (push)  FsPersistence │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ update(tree, origin)
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        StateEntity                           │
//! │  • writer mutex serializes passes                           │
//! │  • DiffEngine commits changed leaves, records UpdatedItems   │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ Changed
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      UpdateDispatcher                        │
//! │  • handlers in registration order, origin passed through    │
//! │  • domain reactions, re-publish, write-back                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use state_sync::{Coordinator, StateDomain, StateSyncConfig, StateUpdate, UpdatedItem};
//! use state_sync::schema::{Definition, PropertyDescriptor};
//! use state_sync::storage::MemoryDocumentStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Effects;
//!
//! impl StateDomain for Effects {
//!     fn name(&self) -> &str {
//!         "effects"
//!     }
//!
//!     fn describe_schema(&self) -> Definition {
//!         Definition::new()
//!             .with(PropertyDescriptor::scalar("effect", 0))
//!             .with(PropertyDescriptor::scalar("projection", 0))
//!     }
//!
//!     fn on_leaf_changed(&self, item: &UpdatedItem, _update: &StateUpdate<'_>) {
//!         println!("{}", item);
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut coordinator = Coordinator::new(StateSyncConfig::default(), Arc::new(MemoryDocumentStore::new()));
//! let effects = coordinator.add_domain(Arc::new(Effects));
//! coordinator.start().await.unwrap();
//!
//! let reply = effects.endpoint.post(br#"{"effect": 1, "projection": 0}"#).await;
//! assert_eq!(reply.status, 200);
//! assert_eq!(effects.entity.read(), json!({"effect": 1, "projection": 0}));
//!
//! coordinator.shutdown().await;
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`diff`]: the diff engine and [`UpdatedItem`]
//! - [`schema`]: definitions and default population
//! - [`dispatch`]: origins and update handlers
//! - [`entity`]: [`StateEntity`] and the [`StateDomain`] capability
//! - [`transport`]: request/response, push channel and persistence adapters
//! - [`storage`]: document stores (file, memory)
//! - [`scheduler`], [`worker`]: periodic and deferred work
//! - [`coordinator`]: the composition root

pub mod config;
pub mod tree;
pub mod error;
pub mod schema;
pub mod diff;
pub mod dispatch;
pub mod entity;
pub mod transport;
pub mod storage;
pub mod resilience;
pub mod worker;
pub mod scheduler;
pub mod coordinator;
pub mod metrics;

pub use config::StateSyncConfig;
pub use tree::StateTree;
pub use error::StateError;
pub use schema::{Definition, PropertyDescriptor};
pub use diff::{DiffEngine, ShrinkPolicy, UpdateResult, UpdatedItem};
pub use dispatch::{HandlerId, Origin, StateUpdate, UpdateDispatcher, UpdateHandler};
pub use entity::{StateDomain, StateEntity};
pub use transport::{ChannelClient, ChannelEvent, EndpointResponse, EventChannel, FsPersistence, RequestEndpoint, StateAccess};
pub use storage::{DocumentStore, FileDocumentStore, MemoryDocumentStore, StorageError};
pub use resilience::retry::RetryConfig;
pub use worker::{WorkError, WorkQueue};
pub use scheduler::Scheduler;
pub use coordinator::{Coordinator, CoordinatorState, EntityBinding, LoadOutcome};
pub use metrics::LatencyTimer;
