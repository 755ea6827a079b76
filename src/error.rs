// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::storage::traits::StorageError;

/// Errors surfaced by the update path and its adapters.
///
/// A diff pass itself only ever answers [`UpdateResult`](crate::UpdateResult);
/// these cover the boundaries around it.
#[derive(Error, Debug)]
pub enum StateError {
    /// The incoming tree nests arrays deeper than path tracking can hold.
    #[error("array nesting depth {depth} exceeds the maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },
    #[error("document root must be an object, got {0}")]
    InvalidRoot(String),
    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
