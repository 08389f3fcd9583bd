//! NodeStore Trait - Node Graph Abstraction Layer
//!
//! This module defines the `NodeStore` trait that abstracts the transactional
//! node graph the version services run against. The trait is the boundary to
//! an external collaborator: everything above it (facade, history builder,
//! migration engine) is backend-agnostic, and the in-memory reference backend
//! ([`crate::store::MemoryStore`]) exists so the whole engine can be
//! exercised hermetically.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: all methods are async so network-backed stores fit
//!    behind the same trait as embedded ones.
//! 2. **Ambient Transactions**: `begin`/`commit`/`rollback` bracket the
//!    caller's unit of work; every other call runs inside whatever
//!    transaction is ambient. The batch runner owns transaction boundaries.
//! 3. **References Are Values**: nodes are addressed by [`NodeRef`]; holding
//!    a reference implies nothing about existence, and `exists` is the only
//!    way to ask.
//! 4. **Audit Stamping Lives Here**: implementations stamp auditable
//!    properties on create and mutate while `audit()` is enabled, and leave
//!    caller-supplied values untouched while it is paused.

use crate::models::{
    ChildAssoc, ContentData, NodeRef, PeerAssoc, PropertyMap, PropertyValue, QName, StoreRef,
};
use crate::store::audit::AuditSwitch;
use crate::store::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Abstraction over the transactional node graph.
///
/// Implementations must be `Send + Sync`; services share the store as
/// `Arc<dyn NodeStore>`.
#[async_trait]
pub trait NodeStore: Send + Sync {
    //
    // STORES AND EXISTENCE
    //

    /// Root node of the given store.
    ///
    /// # Errors
    ///
    /// `StoreNotFound` if the store has not been created.
    async fn root_node(&self, store: &StoreRef) -> Result<NodeRef, StoreError>;

    /// Whether the node currently exists. Non-existence is an answer, not an
    /// error.
    async fn exists(&self, node: &NodeRef) -> Result<bool, StoreError>;

    /// The node's type name.
    async fn node_type(&self, node: &NodeRef) -> Result<QName, StoreError>;

    //
    // NODE LIFECYCLE
    //

    /// Create a node as a child of `parent`.
    ///
    /// If `properties` carries `sys:node-uuid`, that value becomes the new
    /// node's identifier (identity carry-over); otherwise one is generated.
    /// Returns the created child association.
    async fn create_node(
        &self,
        parent: &NodeRef,
        assoc_type: &QName,
        assoc_qname: &QName,
        node_type: &QName,
        properties: PropertyMap,
    ) -> Result<ChildAssoc, StoreError>;

    /// Delete the node and, recursively, its primary children. Peer
    /// associations from or to deleted nodes are removed.
    async fn delete_node(&self, node: &NodeRef) -> Result<(), StoreError>;

    //
    // PROPERTIES
    //

    async fn properties(&self, node: &NodeRef) -> Result<PropertyMap, StoreError>;

    async fn property(
        &self,
        node: &NodeRef,
        key: &QName,
    ) -> Result<Option<PropertyValue>, StoreError>;

    async fn set_property(
        &self,
        node: &NodeRef,
        key: &QName,
        value: PropertyValue,
    ) -> Result<(), StoreError>;

    /// Remove a property if present; removing an absent property is a no-op.
    async fn remove_property(&self, node: &NodeRef, key: &QName) -> Result<(), StoreError>;

    //
    // ASPECTS
    //

    async fn aspects(&self, node: &NodeRef) -> Result<BTreeSet<QName>, StoreError>;

    async fn has_aspect(&self, node: &NodeRef, aspect: &QName) -> Result<bool, StoreError>;

    /// Attach an aspect, merging its accompanying properties into the node.
    async fn add_aspect(
        &self,
        node: &NodeRef,
        aspect: &QName,
        properties: PropertyMap,
    ) -> Result<(), StoreError>;

    //
    // ASSOCIATIONS
    //

    /// Child associations of the node, in creation order.
    async fn child_assocs(&self, node: &NodeRef) -> Result<Vec<ChildAssoc>, StoreError>;

    /// Child associations of the node restricted to one association type,
    /// in creation order.
    async fn child_assocs_of_type(
        &self,
        node: &NodeRef,
        assoc_type: &QName,
    ) -> Result<Vec<ChildAssoc>, StoreError>;

    /// Name-indexed child lookup: the child of `parent` (under the given
    /// association type) whose `content:name` equals `name`.
    async fn child_by_name(
        &self,
        parent: &NodeRef,
        assoc_type: &QName,
        name: &str,
    ) -> Result<Option<NodeRef>, StoreError>;

    /// The node's primary parent association, if it has one (store roots do
    /// not).
    async fn parent_assoc(&self, node: &NodeRef) -> Result<Option<ChildAssoc>, StoreError>;

    /// Create a peer association between two existing nodes.
    async fn create_association(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        assoc_type: &QName,
    ) -> Result<PeerAssoc, StoreError>;

    /// Peer associations whose source is `node`, optionally filtered by
    /// association type.
    async fn target_assocs(
        &self,
        node: &NodeRef,
        assoc_type: Option<&QName>,
    ) -> Result<Vec<PeerAssoc>, StoreError>;

    /// Peer associations whose target is `node`, optionally filtered by
    /// association type.
    async fn source_assocs(
        &self,
        node: &NodeRef,
        assoc_type: Option<&QName>,
    ) -> Result<Vec<PeerAssoc>, StoreError>;

    //
    // TRANSACTIONS
    //

    /// Open the ambient transaction. Work between `begin` and `commit` is
    /// atomic; `rollback` discards it.
    async fn begin_transaction(&self) -> Result<(), StoreError>;

    async fn commit_transaction(&self) -> Result<(), StoreError>;

    async fn rollback_transaction(&self) -> Result<(), StoreError>;

    //
    // AUDIT
    //

    /// The store's automatic auditable-property management switch.
    fn audit(&self) -> &AuditSwitch;
}

/// Lookup from an opaque numeric content reference to its content
/// descriptor.
///
/// `Ok(None)` means the descriptor no longer resolves; callers treat that as
/// a droppable-property condition, not a failure.
#[async_trait]
pub trait ContentMetadataStore: Send + Sync {
    async fn lookup(&self, content_ref: i64) -> Result<Option<ContentData>, StoreError>;
}
