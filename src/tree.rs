// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Helpers over the state tree.
//!
//! The tree is a plain [`serde_json::Value`]. With the `preserve_order`
//! feature object keys keep their insertion order for presentation, while
//! `==` stays structural and order-insensitive.

use serde_json::{Map, Value};

/// A state tree. Always an object at the root once initialised.
pub type StateTree = Value;

/// An empty root tree (`{}`).
#[must_use]
pub fn empty_tree() -> StateTree {
    Value::Object(Map::new())
}

/// True for documents that carry no content: `null`, `{}` and `[]`.
///
/// Transports deliver these when, for example, a persisted file is missing
/// or truncated. They are never diffed.
#[must_use]
pub fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Render a leaf the way observers see an old value.
///
/// Strings are returned unquoted, `null` becomes an empty string and every
/// other value is compact JSON.
#[must_use]
pub fn leaf_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Longest path of array positions the diff engine can push for `value`.
///
/// Only arrays held by an object key count, and only object elements are
/// entered further: `{"a": 1}` is 0, `{"nodes": [{}]}` is 1 and
/// `{"nodes": [{"controls": [{}]}]}` is 2. Arrays inside arrays and
/// anything below a plain object are diffed as leaves and add nothing.
#[must_use]
pub fn array_nesting(value: &Value) -> usize {
    let Value::Object(map) = value else {
        return 0;
    };
    map.values()
        .map(|child| match child {
            Value::Array(items) => {
                1 + items
                    .iter()
                    .filter(|element| element.is_object())
                    .map(array_nesting)
                    .max()
                    .unwrap_or(0)
            }
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}
