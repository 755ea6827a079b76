// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Push/subscribe adapter.
//!
//! Every committed change, whatever its origin, is re-published as the whole
//! current tree to all connected clients. Messages from clients go through
//! the same update as every other transport, tagged with the client's id so
//! that client can recognise its own echo.
//!
//! Slow clients lag rather than block the writer: the channel is a bounded
//! [`tokio::sync::broadcast`] and a lagging receiver skips to the newest
//! events.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::StateAccess;
use crate::diff::UpdateResult;
use crate::dispatch::{Origin, StateUpdate};
use crate::error::StateError;

/// One pushed message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelEvent {
    /// Entity name for state pushes, or a telemetry event name
    pub event: String,
    /// Who caused the change, when it was a state change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub payload: Value,
}

/// A connected subscriber.
#[derive(Debug)]
pub struct ChannelClient {
    id: String,
    rx: broadcast::Receiver<ChannelEvent>,
}

impl ChannelClient {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Origin this client's own messages carry.
    #[must_use]
    pub fn origin(&self) -> Origin {
        Origin::event(&self.id)
    }

    /// Next event, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(client = %self.id, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(client = %self.id, skipped, "subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

pub struct EventChannel {
    access: Arc<dyn StateAccess>,
    tx: broadcast::Sender<ChannelEvent>,
    /// Last payload sent per telemetry event, for changed-subset pushes
    last_emitted: Mutex<HashMap<String, Map<String, Value>>>,
}

impl EventChannel {
    /// Create the channel and subscribe it to the entity's changes.
    pub fn new(access: Arc<dyn StateAccess>, capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let channel = Arc::new(Self {
            access,
            tx,
            last_emitted: Mutex::new(HashMap::new()),
        });

        let weak: Weak<Self> = Arc::downgrade(&channel);
        channel.access.add_update_handler(
            Arc::new(move |update: &StateUpdate<'_>| {
                if let Some(channel) = weak.upgrade() {
                    channel.push_state(update.tree.clone(), Some(update.origin));
                }
            }),
            false,
        );
        debug!(entity = %channel.access.name(), capacity, "event channel bound");
        channel
    }

    /// Connect a new client with a fresh id.
    pub fn connect(&self) -> ChannelClient {
        let id = Uuid::new_v4().to_string();
        info!(entity = %self.access.name(), client = %id, "client connected");
        ChannelClient {
            id,
            rx: self.tx.subscribe(),
        }
    }

    /// Connect a client and send it the current tree first.
    pub fn connect_with_snapshot(&self) -> ChannelClient {
        let client = self.connect();
        self.publish_current();
        client
    }

    /// Apply a message from `client_id` as an update.
    #[tracing::instrument(skip(self, payload), fields(entity = %self.access.name()))]
    pub async fn receive(&self, client_id: &str, payload: &[u8]) -> Result<UpdateResult, StateError> {
        let incoming: Value = serde_json::from_slice(payload).map_err(|e| {
            warn!(error = %e, "malformed client message");
            StateError::Decode(e)
        })?;
        self.access.update(&incoming, &Origin::event(client_id)).await
    }

    /// Push the current tree to everyone, without an origin.
    pub fn publish_current(&self) -> usize {
        self.push_state(self.access.read(), None)
    }

    /// Push an arbitrary event.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.send(ChannelEvent {
            event: event.to_string(),
            origin: None,
            payload,
        })
    }

    /// Push only the top-level fields of `payload` that differ from the
    /// previous emission of `event`. Returns `false` when nothing changed.
    pub fn emit_changed_subset(&self, event: &str, payload: Map<String, Value>) -> bool {
        let subset = {
            let mut last_emitted = self.last_emitted.lock();
            let last = last_emitted.entry(event.to_string()).or_default();
            let mut subset = Map::new();
            for (key, value) in payload {
                if last.get(&key) != Some(&value) {
                    last.insert(key.clone(), value.clone());
                    subset.insert(key, value);
                }
            }
            subset
        };

        if subset.is_empty() {
            return false;
        }
        debug!(event, fields = subset.len(), "emitting changed fields");
        self.emit(event, Value::Object(subset));
        true
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn push_state(&self, tree: Value, origin: Option<&Origin>) -> usize {
        self.send(ChannelEvent {
            event: self.access.name().to_string(),
            origin: origin.map(|o| o.to_string()),
            payload: tree,
        })
    }

    fn send(&self, event: ChannelEvent) -> usize {
        // No receivers is not an error for a broadcast
        let receivers = self.tx.send(event).unwrap_or(0);
        crate::metrics::record_push(self.access.name(), receivers);
        receivers
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("entity", &self.access.name())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffEngine;
    use crate::entity::StateEntity;
    use crate::schema::Definition;
    use serde_json::json;

    async fn entity() -> Arc<StateEntity> {
        let entity = Arc::new(StateEntity::new("effects", Definition::new(), DiffEngine::default()));
        entity.replace(json!({"effect": 0, "projection": 0})).await.unwrap();
        entity
    }

    #[tokio::test]
    async fn test_pushes_changes_from_other_transports() {
        let entity = entity().await;
        let channel = EventChannel::new(entity.clone(), 8);
        let mut client = channel.connect();
        assert_eq!(channel.subscriber_count(), 1);

        entity.update(&json!({"effect": 1, "projection": 0}), &Origin::http()).await.unwrap();

        let event = client.recv().await.unwrap();
        assert_eq!(event.event, "effects");
        assert_eq!(event.origin.as_deref(), Some("http"));
        assert_eq!(event.payload, json!({"effect": 1, "projection": 0}));
    }

    #[tokio::test]
    async fn test_unchanged_update_pushes_nothing() {
        let entity = entity().await;
        let channel = EventChannel::new(entity.clone(), 8);
        let mut client = channel.connect();

        entity.update(&json!({"effect": 0, "projection": 0}), &Origin::http()).await.unwrap();
        assert!(client.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_client_message_is_tagged_with_client() {
        let entity = entity().await;
        let channel = EventChannel::new(entity.clone(), 8);
        let mut sender = channel.connect();
        let mut other = channel.connect();

        let result = channel.receive(sender.id(), br#"{"effect": 2, "projection": 0}"#).await.unwrap();
        assert_eq!(result, UpdateResult::Changed);

        let own = sender.recv().await.unwrap();
        assert_eq!(own.origin, Some(sender.origin().to_string()));
        let seen = other.recv().await.unwrap();
        assert_eq!(seen.payload["effect"], 2);
    }

    #[tokio::test]
    async fn test_malformed_client_message() {
        let entity = entity().await;
        let channel = EventChannel::new(entity.clone(), 8);
        let err = channel.receive("c1", b"nope").await.unwrap_err();
        assert!(matches!(err, StateError::Decode(_)));
    }

    #[tokio::test]
    async fn test_changed_subset_only() {
        let entity = entity().await;
        let channel = EventChannel::new(entity, 8);
        let mut client = channel.connect();

        let mut status = Map::new();
        status.insert("scripts".into(), json!(["a.sc"]));
        status.insert("uptime".into(), json!(1));
        assert!(channel.emit_changed_subset("status", status.clone()));
        assert_eq!(client.recv().await.unwrap().payload, json!({"scripts": ["a.sc"], "uptime": 1}));

        status.insert("uptime".into(), json!(2));
        assert!(channel.emit_changed_subset("status", status.clone()));
        assert_eq!(client.recv().await.unwrap().payload, json!({"uptime": 2}));

        assert!(!channel.emit_changed_subset("status", status));
        assert!(client.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_on_connect() {
        let entity = entity().await;
        let channel = EventChannel::new(entity, 8);
        let mut client = channel.connect_with_snapshot();
        let event = client.recv().await.unwrap();
        assert!(event.origin.is_none());
        assert_eq!(event.payload, json!({"effect": 0, "projection": 0}));
    }

    #[tokio::test]
    async fn test_serialized_event_omits_missing_origin() {
        let event = ChannelEvent {
            event: "status".into(),
            origin: None,
            payload: json!({"uptime": 3}),
        };
        assert_eq!(serde_json::to_value(&event).unwrap(), json!({"event": "status", "payload": {"uptime": 3}}));
    }
}
