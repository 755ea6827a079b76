// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema definitions describing the shape of a state tree.
//!
//! A [`Definition`] is an ordered list of [`PropertyDescriptor`]s. Scalar
//! properties carry a literal default; array properties carry a nested
//! definition describing one element.
//!
//! # Example
//!
//! ```
//! use state_sync::schema::{Definition, PropertyDescriptor, PropertyKind};
//! use serde_json::json;
//!
//! let definition = Definition::new()
//!     .with(PropertyDescriptor::scalar("brightness", 10).control("range").range(0, 255))
//!     .with(PropertyDescriptor::array(
//!         "nodes",
//!         Definition::new().with(PropertyDescriptor::scalar("animation", "Random")),
//!     ));
//!
//! assert_eq!(definition.len(), 2);
//! assert_eq!(definition.resolve("brightness").unwrap().default, json!(10));
//! assert_eq!(definition.resolve("nodes").unwrap().kind, PropertyKind::Array);
//! ```
//!
//! # Design
//!
//! - **Immutable**: built once per domain, then only read
//! - **Presentation hints** (`control`, `min`, `max`, `values`, `read_only`)
//!   travel with the definition document for UIs; the diff engine ignores them

pub mod defaults;

pub use defaults::{default_element, fill_missing, populate_defaults};

use serde_json::{json, Map, Value};

/// Whether a property holds a leaf value or a list of nested elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar,
    Array,
}

/// One named property of a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    /// Literal default (`null` for arrays and for properties without one)
    pub default: Value,
    /// Element definition, only meaningful for [`PropertyKind::Array`]
    pub nested: Definition,
    /// UI control hint, e.g. `checkbox`, `range`, `select`
    pub control: Option<String>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Options offered by select-like controls
    pub values: Vec<Value>,
    pub read_only: bool,
}

impl PropertyDescriptor {
    /// A scalar property with a literal default.
    #[must_use]
    pub fn scalar(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Scalar,
            default: default.into(),
            nested: Definition::new(),
            control: None,
            min: None,
            max: None,
            values: Vec::new(),
            read_only: false,
        }
    }

    /// A scalar property that starts out as `null`.
    #[must_use]
    pub fn without_default(name: impl Into<String>) -> Self {
        Self::scalar(name, Value::Null)
    }

    /// An array property whose elements follow `nested`.
    #[must_use]
    pub fn array(name: impl Into<String>, nested: Definition) -> Self {
        Self {
            kind: PropertyKind::Array,
            nested,
            ..Self::without_default(name)
        }
    }

    #[must_use]
    pub fn control(mut self, control: impl Into<String>) -> Self {
        self.control = Some(control.into());
        self
    }

    #[must_use]
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind == PropertyKind::Array
    }

    /// Render this descriptor as one entry of the definition document.
    fn to_document(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("name".into(), json!(self.name));
        let kind = match self.kind {
            PropertyKind::Array => "array".to_string(),
            PropertyKind::Scalar => self.control.clone().unwrap_or_else(|| "text".to_string()),
        };
        entry.insert("type".into(), json!(kind));
        if !self.default.is_null() {
            entry.insert("default".into(), self.default.clone());
        }
        if let Some(min) = self.min {
            entry.insert("min".into(), json!(min));
        }
        if let Some(max) = self.max {
            entry.insert("max".into(), json!(max));
        }
        if !self.values.is_empty() {
            entry.insert("values".into(), Value::Array(self.values.clone()));
        }
        if self.read_only {
            entry.insert("ro".into(), json!(true));
        }
        if self.is_array() {
            entry.insert("n".into(), self.nested.to_document());
        }
        Value::Object(entry)
    }
}

/// Ordered property descriptors for one tree level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Definition {
    properties: Vec<PropertyDescriptor>,
}

impl Definition {
    #[must_use]
    pub fn new() -> Self {
        Self { properties: Vec::new() }
    }

    /// Append a property, keeping declaration order.
    #[must_use]
    pub fn with(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Look up a top-level property by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// The definition document served next to the state (`/rest/<name>Def`).
    #[must_use]
    pub fn to_document(&self) -> Value {
        Value::Array(self.properties.iter().map(PropertyDescriptor::to_document).collect())
    }
}
