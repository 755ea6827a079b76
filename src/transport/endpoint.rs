// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request/response adapter.
//!
//! Framework-neutral: the host web server routes `GET`/`POST` on
//! [`path`](RequestEndpoint::path) and `GET` on
//! [`definition_path`](RequestEndpoint::definition_path) to this type and
//! writes back the [`EndpointResponse`].

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::StateAccess;
use crate::dispatch::Origin;
use crate::error::StateError;

/// Status and JSON body of one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: Value,
}

impl EndpointResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl std::fmt::Display) -> Self {
        Self {
            status,
            body: json!({ "error": message.to_string() }),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Serialized body for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.body.to_string().into_bytes()
    }
}

pub struct RequestEndpoint {
    access: Arc<dyn StateAccess>,
    path: String,
}

impl RequestEndpoint {
    pub fn new(access: Arc<dyn StateAccess>) -> Self {
        let path = format!("/rest/{}", access.name());
        Self { access, path }
    }

    /// Route of the tree itself.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Route of the schema definition document.
    #[must_use]
    pub fn definition_path(&self) -> String {
        format!("{}Def", self.path)
    }

    /// Current tree.
    #[must_use]
    pub fn get(&self) -> EndpointResponse {
        EndpointResponse::ok(self.access.read())
    }

    /// Schema definition document, for clients that render editors.
    #[must_use]
    pub fn definition(&self) -> EndpointResponse {
        EndpointResponse::ok(self.access.definition().to_document())
    }

    /// Decode `body` and submit it as an update.
    pub async fn post(&self, body: &[u8]) -> EndpointResponse {
        match serde_json::from_slice::<Value>(body) {
            Ok(incoming) => self.post_json(incoming).await,
            Err(e) => {
                warn!(path = %self.path, error = %e, "malformed request body");
                EndpointResponse::error(400, StateError::Decode(e))
            }
        }
    }

    /// Submit an already decoded document. Replies with the tree as it is
    /// after the update, changed or not.
    pub async fn post_json(&self, incoming: Value) -> EndpointResponse {
        match self.access.update(&incoming, &Origin::http()).await {
            Ok(result) => {
                debug!(path = %self.path, result = %result, "request applied");
                EndpointResponse::ok(self.access.read())
            }
            Err(e @ StateError::Storage(_)) => {
                warn!(path = %self.path, error = %e, "request failed");
                EndpointResponse::error(500, e)
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "request rejected");
                EndpointResponse::error(400, e)
            }
        }
    }
}

impl std::fmt::Debug for RequestEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEndpoint").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffEngine;
    use crate::entity::StateEntity;
    use crate::schema::{Definition, PropertyDescriptor};

    async fn effects() -> Arc<StateEntity> {
        let definition = Definition::new()
            .with(PropertyDescriptor::scalar("effect", 0).control("select").values(["Solid", "Rainbow"]))
            .with(PropertyDescriptor::scalar("projection", 0));
        let entity = Arc::new(StateEntity::new("effects", definition, DiffEngine::default()));
        entity.populate_defaults().await;
        entity
    }

    #[tokio::test]
    async fn test_routes() {
        let endpoint = RequestEndpoint::new(effects().await);
        assert_eq!(endpoint.path(), "/rest/effects");
        assert_eq!(endpoint.definition_path(), "/rest/effectsDef");
    }

    #[tokio::test]
    async fn test_get_returns_tree() {
        let endpoint = RequestEndpoint::new(effects().await);
        let response = endpoint.get();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"effect": 0, "projection": 0}));
    }

    #[tokio::test]
    async fn test_post_replies_with_current_tree() {
        let entity = effects().await;
        let endpoint = RequestEndpoint::new(entity.clone());

        let response = endpoint.post(br#"{"effect": 1, "projection": 0}"#).await;
        assert!(response.is_success());
        assert_eq!(response.body, json!({"effect": 1, "projection": 0}));
        assert_eq!(entity.read()["effect"], 1);

        let bytes = endpoint.post(br#"{"effect": 1, "projection": 0}"#).await.to_bytes();
        let echoed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(echoed["effect"], 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_client_error() {
        let entity = effects().await;
        let endpoint = RequestEndpoint::new(entity.clone());

        let response = endpoint.post(b"{not json").await;
        assert_eq!(response.status, 400);
        assert!(response.body["error"].is_string());

        let response = endpoint.post(b"[1, 2]").await;
        assert_eq!(response.status, 400);
        assert_eq!(entity.read(), json!({"effect": 0, "projection": 0}));
    }

    #[tokio::test]
    async fn test_definition_document() {
        let endpoint = RequestEndpoint::new(effects().await);
        let response = endpoint.definition();
        assert_eq!(response.status, 200);
        let entries = response.body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "effect");
        assert_eq!(entries[0]["type"], "select");
    }
}
