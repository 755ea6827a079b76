// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Leaf-level change records and the path stack that positions them.

use serde::Serialize;
use serde_json::Value;

use crate::error::StateError;

/// One changed leaf, produced by a diff pass.
///
/// `parent[d]` is the name of the array property entered at nesting level
/// `d` and `index[d]` the element position inside it. Top-level leaves have
/// empty paths.
///
/// # Example
///
/// ```
/// use state_sync::DiffEngine;
/// use serde_json::json;
///
/// let engine = DiffEngine::default();
/// let mut current = json!({"nodes": [{"animation": "Random"}]});
/// let mut items = Vec::new();
/// engine.update(&mut current, &json!({"nodes": [{"animation": "Sinelon"}]}), &mut items).unwrap();
///
/// let item = &items[0];
/// assert_eq!(item.name, "animation");
/// assert_eq!(item.old_value, "Random");
/// assert_eq!(item.parent_at(0), Some("nodes"));
/// assert_eq!(item.index_at(0), Some(0));
/// assert_eq!(item.to_string(), "nodes[0].animation = Random -> Sinelon");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedItem {
    /// Leaf name (the array property's name for arrays of scalars)
    pub name: String,
    /// Previous value as text: strings unquoted, `null` empty
    pub old_value: String,
    /// New value in its native type
    pub value: Value,
    pub parent: Vec<String>,
    pub index: Vec<usize>,
}

impl UpdatedItem {
    /// Number of array levels above this leaf.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.parent.len()
    }

    #[must_use]
    pub fn parent_at(&self, depth: usize) -> Option<&str> {
        self.parent.get(depth).map(String::as_str)
    }

    #[must_use]
    pub fn index_at(&self, depth: usize) -> Option<usize> {
        self.index.get(depth).copied()
    }

    /// True if this leaf sits inside elements of the top-level array `name`.
    #[must_use]
    pub fn is_under(&self, name: &str) -> bool {
        self.parent_at(0) == Some(name)
    }

    /// New value rendered the same way as `old_value`.
    #[must_use]
    pub fn value_text(&self) -> String {
        crate::tree::leaf_to_text(&self.value)
    }

    /// True when the leaf was cleared, e.g. because its element was removed.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.value.is_null()
    }
}

impl std::fmt::Display for UpdatedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (parent, index) in self.parent.iter().zip(&self.index) {
            write!(f, "{}[{}].", parent, index)?;
        }
        write!(f, "{} = {} -> {}", self.name, self.old_value, self.value_text())
    }
}

/// Bounded stack of `(array name, element index)` pairs.
#[derive(Debug)]
pub(crate) struct PathStack {
    parent: Vec<String>,
    index: Vec<usize>,
    max_depth: usize,
}

impl PathStack {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            parent: Vec::with_capacity(max_depth),
            index: Vec::with_capacity(max_depth),
            max_depth,
        }
    }

    pub(crate) fn push(&mut self, parent: &str, index: usize) -> Result<(), StateError> {
        if self.parent.len() >= self.max_depth {
            return Err(StateError::DepthExceeded {
                depth: self.parent.len() + 1,
                max: self.max_depth,
            });
        }
        self.parent.push(parent.to_string());
        self.index.push(index);
        Ok(())
    }

    pub(crate) fn pop(&mut self) {
        self.parent.pop();
        self.index.pop();
    }

    pub(crate) fn record(&self, name: &str, old: &Value, new: &Value) -> UpdatedItem {
        UpdatedItem {
            name: name.to_string(),
            old_value: crate::tree::leaf_to_text(old),
            value: new.clone(),
            parent: self.parent.clone(),
            index: self.index.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_stack_bounds() {
        let mut path = PathStack::new(2);
        path.push("nodes", 0).unwrap();
        path.push("controls", 3).unwrap();
        assert!(matches!(
            path.push("deeper", 0),
            Err(StateError::DepthExceeded { depth: 3, max: 2 })
        ));

        let item = path.record("value", &json!("128"), &json!("200"));
        assert_eq!(item.parent, vec!["nodes", "controls"]);
        assert_eq!(item.index, vec![0, 3]);
        assert_eq!(item.depth(), 2);

        path.pop();
        assert_eq!(path.record("size", &json!(1), &json!(2)).depth(), 1);
    }

    #[test]
    fn test_display_top_level() {
        let item = PathStack::new(4).record("effect", &json!(0), &json!(1));
        assert_eq!(item.to_string(), "effect = 0 -> 1");
        assert!(!item.is_under("nodes"));
    }

    #[test]
    fn test_removal_flag() {
        let item = PathStack::new(4).record("animation", &json!("Random"), &Value::Null);
        assert!(item.is_removal());
        assert_eq!(item.value_text(), "");
    }
}
