//! Public types for the coordinator.

use std::sync::Arc;

use crate::entity::StateEntity;
use crate::transport::{EventChannel, FsPersistence, RequestEndpoint};

/// Coordinator lifecycle state.
///
/// Use [`super::Coordinator::state()`] to check the current state or
/// [`super::Coordinator::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Built, entities may still be added
    Created,
    /// Loading persisted documents and populating defaults
    Loading,
    /// Writers and scheduler are running
    Running,
    /// Stopping background tasks and flushing pending writes
    ShuttingDown,
    /// Everything stopped; the trees stay readable
    Stopped,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Loading => write!(f, "Loading"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// One entity and the three transports bound to it.
#[derive(Debug, Clone)]
pub struct EntityBinding {
    pub entity: Arc<StateEntity>,
    pub endpoint: Arc<RequestEndpoint>,
    pub channel: Arc<EventChannel>,
    pub persistence: Arc<FsPersistence>,
}

impl EntityBinding {
    #[must_use]
    pub fn name(&self) -> &str {
        self.entity.name()
    }
}

/// What startup did for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The persisted document replaced the tree
    Loaded,
    /// Nothing persisted; the tree was populated from its definition
    Defaulted,
    /// The store failed; the tree was populated from its definition
    Recovered,
}

impl std::fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded => write!(f, "Loaded"),
            Self::Defaulted => write!(f, "Defaulted"),
            Self::Recovered => write!(f, "Recovered"),
        }
    }
}
