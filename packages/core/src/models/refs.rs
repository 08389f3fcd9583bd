//! Store and Node References
//!
//! A `StoreRef` addresses one named partition of the node graph by
//! `(protocol, identifier)`; a `NodeRef` addresses one node within a store.
//! References are plain value types: holding one says nothing about whether
//! the node still exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reference to a store: a named partition of the node graph with its own
/// root node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreRef {
    protocol: String,
    identifier: String,
}

impl StoreRef {
    pub fn new(protocol: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            identifier: identifier.into(),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Derive the tenant-scoped variant of this store, `identifier@tenant`.
    ///
    /// The default (unscoped) store is returned unchanged for an empty tenant
    /// name.
    pub fn for_tenant(&self, tenant: &str) -> Self {
        if tenant.is_empty() {
            return self.clone();
        }
        Self {
            protocol: self.protocol.clone(),
            identifier: format!("{}@{}", self.identifier, tenant),
        }
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.identifier)
    }
}

/// Reference to a single node: the owning store plus the node's stable
/// identifier (a UUID for most nodes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    store: StoreRef,
    id: String,
}

impl NodeRef {
    pub fn new(store: StoreRef, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }

    /// A fresh reference with a generated UUID identifier.
    pub fn generate(store: StoreRef) -> Self {
        Self {
            store,
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The same node identifier viewed through a different store.
    pub fn in_store(&self, store: &StoreRef) -> NodeRef {
        NodeRef::new(store.clone(), self.id.clone())
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.id)
    }
}
