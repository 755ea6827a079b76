// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Diff engine: finds changed leaves between two trees and commits them.
//!
//! # Algorithm
//!
//! ```text
//! incoming empty?            ──yes──► Unchanged
//! current == incoming?       ──yes──► Unchanged (no recursion)
//! array nesting > max_depth? ──yes──► DepthExceeded (nothing mutated)
//! for key in keys(current) ++ new keys(incoming):
//!     equal            → skip
//!     array on a side  → walk positions 0..max(len), push (key, i), recurse
//!     otherwise (leaf) → record UpdatedItem, overwrite leaf in current
//! ```
//!
//! Keys missing from the incoming tree compare as `null`: every transport
//! delivers full documents.
//!
//! # Shrinking arrays
//!
//! Surplus elements of the current array are reported field by field as
//! changed to `null` and then dropped. [`ShrinkPolicy::AfterScan`] drops them
//! once every position has been compared. [`ShrinkPolicy::Immediate`] drops
//! an element as soon as its position was visited while the current array is
//! still longer, which shifts later elements under the cursor and leaves
//! some of them uncompared.

mod updated_item;

pub use updated_item::UpdatedItem;
use updated_item::PathStack;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::StateError;
use crate::tree::{array_nesting, is_empty_document};

static NULL: Value = Value::Null;

/// Outcome of one diff pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// Nothing was recorded; observers are not notified
    Unchanged,
    /// At least one leaf changed and was committed
    Changed,
}

impl UpdateResult {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed)
    }
}

impl std::fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "Unchanged"),
            Self::Changed => write!(f, "Changed"),
        }
    }
}

/// When surplus elements of a shrinking array are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkPolicy {
    /// Compare every position first, then truncate
    #[default]
    AfterScan,
    /// Remove at the visited position while the array is too long
    Immediate,
}

/// Computes and commits leaf-level differences between state trees.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    max_depth: usize,
    shrink_policy: ShrinkPolicy,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(16, ShrinkPolicy::default())
    }
}

impl DiffEngine {
    #[must_use]
    pub fn new(max_depth: usize, shrink_policy: ShrinkPolicy) -> Self {
        Self { max_depth, shrink_policy }
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn shrink_policy(&self) -> ShrinkPolicy {
        self.shrink_policy
    }

    /// Fail if either tree nests arrays deeper than paths can track.
    pub fn check_depth(&self, tree: &Value) -> Result<(), StateError> {
        let depth = array_nesting(tree);
        if depth > self.max_depth {
            return Err(StateError::DepthExceeded { depth, max: self.max_depth });
        }
        Ok(())
    }

    /// Diff `incoming` against `current`, committing every changed leaf.
    ///
    /// `items` is cleared first and then holds the changes of this pass, in
    /// visiting order.
    pub fn update(
        &self,
        current: &mut Value,
        incoming: &Value,
        items: &mut Vec<UpdatedItem>,
    ) -> Result<UpdateResult, StateError> {
        items.clear();

        if is_empty_document(incoming) {
            debug!("empty document ignored");
            return Ok(UpdateResult::Unchanged);
        }
        if current == incoming {
            return Ok(UpdateResult::Unchanged);
        }
        let Some(incoming_map) = incoming.as_object() else {
            return Err(StateError::InvalidRoot(kind_name(incoming)));
        };
        self.check_depth(incoming)?;
        self.check_depth(current)?;

        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let mut path = PathStack::new(self.max_depth);
        if let Value::Object(current_map) = current {
            self.diff_object(current_map, incoming_map, &mut path, items)?;
        }

        Ok(if items.is_empty() {
            UpdateResult::Unchanged
        } else {
            UpdateResult::Changed
        })
    }

    fn diff_object(
        &self,
        current: &mut Map<String, Value>,
        incoming: &Map<String, Value>,
        path: &mut PathStack,
        items: &mut Vec<UpdatedItem>,
    ) -> Result<(), StateError> {
        let mut keys: Vec<String> = current.keys().cloned().collect();
        keys.extend(incoming.keys().filter(|k| !current.contains_key(*k)).cloned());

        for key in keys {
            let new = incoming.get(&key).unwrap_or(&NULL);
            let (old_is_array, old_is_null) = {
                let old = current.get(&key).unwrap_or(&NULL);
                if old == new {
                    continue;
                }
                (old.is_array(), old.is_null())
            };

            let array_pair = (old_is_array || new.is_array())
                && (old_is_array || old_is_null)
                && (new.is_array() || new.is_null());

            if array_pair {
                let slot = current.entry(key.clone()).or_insert(Value::Null);
                if slot.is_null() {
                    *slot = Value::Array(Vec::new());
                }
                let new_items: &[Value] = new.as_array().map(Vec::as_slice).unwrap_or(&[]);
                if let Value::Array(old_items) = slot {
                    self.diff_array(&key, old_items, new_items, path, items)?;
                }
                if new.is_null() {
                    *slot = Value::Null;
                }
            } else {
                let old = current.get(&key).unwrap_or(&NULL);
                let item = path.record(&key, old, new);
                trace!(item = %item, "leaf changed");
                items.push(item);
                current.insert(key, new.clone());
            }
        }
        Ok(())
    }

    fn diff_array(
        &self,
        key: &str,
        current: &mut Vec<Value>,
        incoming: &[Value],
        path: &mut PathStack,
        items: &mut Vec<UpdatedItem>,
    ) -> Result<(), StateError> {
        match self.shrink_policy {
            ShrinkPolicy::AfterScan => {
                let positions = current.len().max(incoming.len());
                for i in 0..positions {
                    if i >= current.len() {
                        current.push(blank_element(incoming.get(i)));
                    }
                    self.diff_position(key, i, current, incoming, path, items)?;
                }
                current.truncate(incoming.len());
            }
            ShrinkPolicy::Immediate => {
                let mut i = 0;
                while i < current.len().max(incoming.len()) {
                    if current.len() < incoming.len() {
                        current.push(blank_element(incoming.get(current.len())));
                    }
                    if i >= current.len() {
                        break;
                    }
                    self.diff_position(key, i, current, incoming, path, items)?;
                    if current.len() > incoming.len() {
                        current.remove(i);
                    }
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn diff_position(
        &self,
        key: &str,
        i: usize,
        current: &mut [Value],
        incoming: &[Value],
        path: &mut PathStack,
        items: &mut Vec<UpdatedItem>,
    ) -> Result<(), StateError> {
        let new = incoming.get(i).unwrap_or(&NULL);
        let old = &mut current[i];
        if *old == *new {
            return Ok(());
        }

        path.push(key, i)?;
        let result = self.diff_element(key, old, new, path, items);
        path.pop();
        result
    }

    fn diff_element(
        &self,
        key: &str,
        old: &mut Value,
        new: &Value,
        path: &mut PathStack,
        items: &mut Vec<UpdatedItem>,
    ) -> Result<(), StateError> {
        if new.is_object() || (new.is_null() && old.is_object()) {
            if !old.is_object() {
                *old = Value::Object(Map::new());
            }
            let empty = Map::new();
            let new_map = new.as_object().unwrap_or(&empty);
            if let Value::Object(old_map) = old {
                self.diff_object(old_map, new_map, path, items)?;
            }
            if new.is_null() {
                *old = Value::Null;
            }
        } else {
            let item = path.record(key, old, new);
            trace!(item = %item, "element changed");
            items.push(item);
            *old = new.clone();
        }
        Ok(())
    }
}

/// Placeholder appended when the incoming array is longer.
///
/// Object rows start empty so every field of the new row is reported.
fn blank_element(incoming: Option<&Value>) -> Value {
    match incoming {
        Some(Value::Object(_)) => Value::Object(Map::new()),
        _ => Value::Null,
    }
}

fn kind_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
