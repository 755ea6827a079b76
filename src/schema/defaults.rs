// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Default population of a fresh tree from its definition.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{Definition, PropertyDescriptor};

/// Fill an empty tree from `definition`.
///
/// Scalars get their literal default. Every array gets exactly one element,
/// itself populated recursively from the nested definition.
///
/// Returns `true` if the tree was populated. A non-empty tree is never
/// touched, and an empty definition leaves the tree empty (logged, callers
/// must treat that tree as underspecified).
pub fn populate_defaults(tree: &mut Value, definition: &Definition) -> bool {
    if !crate::tree::is_empty_document(tree) {
        debug!("tree already has content, skipping defaults");
        return false;
    }
    if definition.is_empty() {
        warn!("no definition, tree left empty");
        return false;
    }

    let mut root = Map::new();
    fill(&mut root, definition);
    *tree = Value::Object(root);
    true
}

/// Add every top-level property of `definition` that `tree` lacks.
///
/// Present keys keep their value, including `null`. Used after loading a
/// document written before the definition grew. Returns the names added.
pub fn fill_missing(tree: &mut Value, definition: &Definition) -> Vec<String> {
    let Value::Object(root) = tree else {
        return Vec::new();
    };
    let mut added = Vec::new();
    for property in definition.iter() {
        if root.contains_key(&property.name) {
            continue;
        }
        root.insert(property.name.clone(), default_value(property));
        added.push(property.name.clone());
    }
    added
}

/// A freshly defaulted element for an array described by `definition`.
#[must_use]
pub fn default_element(definition: &Definition) -> Value {
    let mut element = Map::new();
    fill(&mut element, definition);
    Value::Object(element)
}

fn default_value(property: &PropertyDescriptor) -> Value {
    if property.is_array() {
        Value::Array(vec![default_element(&property.nested)])
    } else {
        property.default.clone()
    }
}

fn fill(object: &mut Map<String, Value>, definition: &Definition) {
    for property in definition.iter() {
        object.insert(property.name.clone(), default_value(property));
    }
}
