//! Property Values
//!
//! Node properties are namespaced keys mapped to typed values. Values are
//! scalars, references to other nodes, content references, or multi-valued
//! collections of any of those. The legacy version schema stores each frozen
//! property as its own child node with an explicit multi-value flag; the
//! current schema keeps the whole map on the version node. Both encodings
//! decode into this one representation.

use crate::models::{NodeRef, QName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map of property key to value, ordered by key.
pub type PropertyMap = BTreeMap<QName, PropertyValue>;

/// Descriptor for a piece of stored content, resolved from a numeric content
/// reference through the content-metadata lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentData {
    pub mime_type: String,
    pub encoding: String,
    pub size: u64,
    pub url: String,
}

/// A single property value.
///
/// `ContentRef` is the raw numeric reference as persisted; `Content` is the
/// rich descriptor it resolves to. Readers of frozen state only ever see
/// `Content` (or nothing, when the descriptor no longer resolves).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    /// A qualified name stored as a value (frozen type names, aspect lists).
    Name(QName),
    /// Reference to another node.
    Ref(NodeRef),
    /// Raw numeric content reference, as persisted by the legacy schema.
    ContentRef(i64),
    /// Resolved content descriptor.
    Content(ContentData),
    /// Multi-valued property.
    Multi(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&QName> {
        match self {
            PropertyValue::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_node_ref(&self) -> Option<&NodeRef> {
        match self {
            PropertyValue::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, PropertyValue::Multi(_))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Timestamp(value)
    }
}

impl From<NodeRef> for PropertyValue {
    fn from(value: NodeRef) -> Self {
        PropertyValue::Ref(value)
    }
}

impl From<QName> for PropertyValue {
    fn from(value: QName) -> Self {
        PropertyValue::Name(value)
    }
}
