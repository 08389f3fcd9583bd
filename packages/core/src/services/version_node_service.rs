//! Version Node Facade - Dual-Schema Read Contract
//!
//! `VersionNodeService` makes a frozen version node answer the logical
//! node-read contract regardless of which physical schema encodes it. The
//! encoding is chosen by store identity at the call boundary and carried as a
//! tagged [`FrozenEncoding`], so each read dispatches once and then runs
//! straight-line decode code for its schema.
//!
//! Reads tolerate the repository moving on underneath the frozen state:
//! associations whose target no longer exists are silently dropped, and a
//! content descriptor that no longer resolves costs exactly that property
//! (logged, not fatal). Reconstructed associations are sorted into their
//! natural order so callers see the same sequence the frozen state was
//! captured in, independent of physical child creation order.
//!
//! Version stores are read-only through this facade; every mutation fails
//! with [`VersionServiceError::ReadOnlyVersionStore`].

use crate::models::schema::{content_model, legacy_model, system_model, version2_model};
use crate::models::{
    ChildAssoc, NodeRef, PeerAssoc, PropertyMap, PropertyValue, QName, SchemaDescriptor,
};
use crate::services::error::VersionServiceError;
use crate::store::{ContentMetadataStore, NodeStore};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which physical schema encodes a given version node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrozenEncoding {
    Legacy,
    Current,
}

pub struct VersionNodeService {
    store: Arc<dyn NodeStore>,
    content: Arc<dyn ContentMetadataStore>,
    legacy: SchemaDescriptor,
    current: SchemaDescriptor,
}

impl VersionNodeService {
    pub fn new(
        store: Arc<dyn NodeStore>,
        content: Arc<dyn ContentMetadataStore>,
        legacy: SchemaDescriptor,
        current: SchemaDescriptor,
    ) -> Self {
        Self {
            store,
            content,
            legacy,
            current,
        }
    }

    /// Resolve the encoding of a version node from its store identity.
    pub fn encoding_of(&self, node: &NodeRef) -> Result<FrozenEncoding, VersionServiceError> {
        if node.store() == &self.legacy.store {
            Ok(FrozenEncoding::Legacy)
        } else if node.store() == &self.current.store {
            Ok(FrozenEncoding::Current)
        } else {
            Err(VersionServiceError::NotAVersionNode { node: node.clone() })
        }
    }

    //
    // READ CONTRACT
    //

    /// The frozen node's type.
    pub async fn node_type(&self, node: &NodeRef) -> Result<QName, VersionServiceError> {
        match self.encoding_of(node)? {
            FrozenEncoding::Legacy => {
                let value = self
                    .store
                    .property(node, &legacy_model::prop_frozen_node_type())
                    .await?;
                value
                    .as_ref()
                    .and_then(|v| v.as_name())
                    .cloned()
                    .ok_or_else(|| {
                        VersionServiceError::corrupt_history(format!(
                            "version node {node} has no frozen type"
                        ))
                    })
            }
            FrozenEncoding::Current => Ok(self.store.node_type(node).await?),
        }
    }

    /// The frozen node's aspect set.
    pub async fn aspects(&self, node: &NodeRef) -> Result<BTreeSet<QName>, VersionServiceError> {
        match self.encoding_of(node)? {
            FrozenEncoding::Legacy => {
                let value = self
                    .store
                    .property(node, &legacy_model::prop_frozen_aspects())
                    .await?;
                let mut aspects = BTreeSet::new();
                if let Some(PropertyValue::Multi(values)) = value {
                    for entry in values {
                        if let PropertyValue::Name(name) = entry {
                            aspects.insert(name);
                        }
                    }
                }
                Ok(aspects)
            }
            FrozenEncoding::Current => {
                let mut aspects = self.store.aspects(node).await?;
                aspects.remove(&version2_model::aspect_version());
                Ok(aspects)
            }
        }
    }

    /// The frozen property map.
    pub async fn properties(&self, node: &NodeRef) -> Result<PropertyMap, VersionServiceError> {
        match self.encoding_of(node)? {
            FrozenEncoding::Legacy => self.legacy_properties(node).await,
            FrozenEncoding::Current => self.current_properties(node).await,
        }
    }

    /// One frozen property.
    pub async fn property(
        &self,
        node: &NodeRef,
        key: &QName,
    ) -> Result<Option<PropertyValue>, VersionServiceError> {
        Ok(self.properties(node).await?.remove(key))
    }

    /// Frozen child associations, targets filtered to still-existing nodes,
    /// in natural order.
    pub async fn child_assocs(
        &self,
        node: &NodeRef,
    ) -> Result<Vec<ChildAssoc>, VersionServiceError> {
        let mut assocs = match self.encoding_of(node)? {
            FrozenEncoding::Legacy => self.legacy_child_assocs(node).await?,
            FrozenEncoding::Current => self.current_child_assocs(node).await?,
        };
        assocs.sort();
        Ok(assocs)
    }

    /// Frozen peer associations, targets filtered to still-existing nodes,
    /// in natural order.
    pub async fn peer_assocs(&self, node: &NodeRef) -> Result<Vec<PeerAssoc>, VersionServiceError> {
        let mut assocs = match self.encoding_of(node)? {
            FrozenEncoding::Legacy => self.legacy_peer_assocs(node).await?,
            FrozenEncoding::Current => self.current_peer_assocs(node).await?,
        };
        assocs.sort();
        Ok(assocs)
    }

    /// Parent associations of a version node: a single simulated edge to the
    /// owning version store's root (version nodes have no real parent in the
    /// logical contract).
    pub async fn parent_assocs(
        &self,
        node: &NodeRef,
    ) -> Result<Vec<ChildAssoc>, VersionServiceError> {
        Ok(vec![self.primary_parent(node).await?])
    }

    pub async fn primary_parent(&self, node: &NodeRef) -> Result<ChildAssoc, VersionServiceError> {
        // Resolve the store first so the simulated edge targets the right
        // root for either encoding.
        self.encoding_of(node)?;
        let root = self.store.root_node(node.store()).await?;
        Ok(ChildAssoc {
            parent: root,
            child: node.clone(),
            assoc_type: system_model::assoc_children(),
            qname: system_model::assoc_versioned_state(),
            is_primary: true,
            nth_sibling: -1,
        })
    }

    //
    // MUTATIONS - not supported by design
    //

    pub fn create_node(
        &self,
        _parent: &NodeRef,
        _assoc_type: &QName,
        _assoc_qname: &QName,
        _node_type: &QName,
        _properties: PropertyMap,
    ) -> Result<ChildAssoc, VersionServiceError> {
        Err(VersionServiceError::read_only("create_node"))
    }

    pub fn set_property(
        &self,
        _node: &NodeRef,
        _key: &QName,
        _value: PropertyValue,
    ) -> Result<(), VersionServiceError> {
        Err(VersionServiceError::read_only("set_property"))
    }

    pub fn add_aspect(
        &self,
        _node: &NodeRef,
        _aspect: &QName,
        _properties: PropertyMap,
    ) -> Result<(), VersionServiceError> {
        Err(VersionServiceError::read_only("add_aspect"))
    }

    pub fn remove_aspect(&self, _node: &NodeRef, _aspect: &QName) -> Result<(), VersionServiceError> {
        Err(VersionServiceError::read_only("remove_aspect"))
    }

    pub fn delete_node(&self, _node: &NodeRef) -> Result<(), VersionServiceError> {
        Err(VersionServiceError::read_only("delete_node"))
    }

    pub fn remove_child(
        &self,
        _parent: &NodeRef,
        _child: &NodeRef,
    ) -> Result<(), VersionServiceError> {
        Err(VersionServiceError::read_only("remove_child"))
    }

    pub fn create_association(
        &self,
        _source: &NodeRef,
        _target: &NodeRef,
        _assoc_type: &QName,
    ) -> Result<PeerAssoc, VersionServiceError> {
        Err(VersionServiceError::read_only("create_association"))
    }

    //
    // LEGACY DECODE
    //

    /// Fan out over the per-property capture children.
    async fn legacy_properties(
        &self,
        node: &NodeRef,
    ) -> Result<PropertyMap, VersionServiceError> {
        let captures = self
            .store
            .child_assocs_of_type(node, &legacy_model::assoc_versioned_attributes())
            .await?;
        let mut properties = PropertyMap::new();
        for capture in captures {
            let key = self
                .store
                .property(&capture.child, &legacy_model::prop_qname())
                .await?
                .as_ref()
                .and_then(|v| v.as_name())
                .cloned();
            let Some(key) = key else {
                tracing::warn!(
                    "frozen property capture {} has no key, skipping",
                    capture.child
                );
                continue;
            };
            let is_multi = self
                .store
                .property(&capture.child, &legacy_model::prop_is_multi_value())
                .await?
                .as_ref()
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let value_key = if is_multi {
                legacy_model::prop_multi_value()
            } else {
                legacy_model::prop_value()
            };
            let Some(value) = self.store.property(&capture.child, &value_key).await? else {
                continue;
            };
            if let Some(resolved) = self.resolve_content(&key, value).await? {
                properties.insert(key, resolved);
            }
        }
        Ok(properties)
    }

    async fn legacy_child_assocs(
        &self,
        node: &NodeRef,
    ) -> Result<Vec<ChildAssoc>, VersionServiceError> {
        let captures = self
            .store
            .child_assocs_of_type(node, &legacy_model::assoc_versioned_child_assocs())
            .await?;
        let mut assocs = Vec::with_capacity(captures.len());
        for capture in captures {
            let props = self.store.properties(&capture.child).await?;
            let Some(target) = props
                .get(&content_model::prop_reference())
                .and_then(|v| v.as_node_ref())
                .cloned()
            else {
                continue;
            };
            // Target deleted since versioning: drop the association.
            if !self.store.exists(&target).await? {
                continue;
            }
            let assoc_type = props
                .get(&legacy_model::prop_assoc_type_qname())
                .and_then(|v| v.as_name())
                .cloned()
                .unwrap_or_else(system_model::assoc_children);
            let qname = props
                .get(&legacy_model::prop_assoc_qname())
                .and_then(|v| v.as_name())
                .cloned()
                .unwrap_or_else(system_model::assoc_children);
            let is_primary = props
                .get(&legacy_model::prop_is_primary())
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let nth_sibling = props
                .get(&legacy_model::prop_nth_sibling())
                .and_then(|v| v.as_int())
                .unwrap_or(-1) as i32;
            assocs.push(ChildAssoc {
                parent: node.clone(),
                child: target,
                assoc_type,
                qname,
                is_primary,
                nth_sibling,
            });
        }
        Ok(assocs)
    }

    async fn legacy_peer_assocs(
        &self,
        node: &NodeRef,
    ) -> Result<Vec<PeerAssoc>, VersionServiceError> {
        let captures = self
            .store
            .child_assocs_of_type(node, &legacy_model::assoc_versioned_assocs())
            .await?;
        let mut assocs = Vec::with_capacity(captures.len());
        for capture in captures {
            let props = self.store.properties(&capture.child).await?;
            let Some(target) = props
                .get(&content_model::prop_reference())
                .and_then(|v| v.as_node_ref())
                .cloned()
            else {
                continue;
            };
            if !self.store.exists(&target).await? {
                continue;
            }
            let Some(assoc_type) = props
                .get(&legacy_model::prop_assoc_type_qname())
                .and_then(|v| v.as_name())
                .cloned()
            else {
                continue;
            };
            assocs.push(PeerAssoc {
                source: node.clone(),
                target,
                assoc_type,
            });
        }
        Ok(assocs)
    }

    //
    // CURRENT DECODE
    //

    /// The current schema keeps the frozen map on the version node itself;
    /// strip the version-store bookkeeping and map the frozen auditable
    /// fields back to their content-model keys.
    async fn current_properties(
        &self,
        node: &NodeRef,
    ) -> Result<PropertyMap, VersionServiceError> {
        let raw = self.store.properties(node).await?;
        let mut properties = PropertyMap::new();
        for (key, value) in &raw {
            if key.is_in(crate::models::schema::NS_VERSION2) {
                continue;
            }
            // The version node's own audit fields are not frozen state.
            if content_model::auditable_properties().contains(key) {
                continue;
            }
            if let Some(resolved) = self.resolve_content(key, value.clone()).await? {
                properties.insert(key.clone(), resolved);
            }
        }
        for (frozen, original) in [
            (version2_model::prop_frozen_created(), content_model::prop_created()),
            (version2_model::prop_frozen_creator(), content_model::prop_creator()),
            (version2_model::prop_frozen_modified(), content_model::prop_modified()),
            (version2_model::prop_frozen_modifier(), content_model::prop_modifier()),
            (version2_model::prop_frozen_accessed(), content_model::prop_accessed()),
        ] {
            if let Some(value) = raw.get(&frozen) {
                properties.insert(original, value.clone());
            }
        }
        if let Some(db_id) = raw.get(&version2_model::prop_frozen_node_dbid()) {
            properties.insert(system_model::prop_node_dbid(), db_id.clone());
        }
        Ok(properties)
    }

    async fn current_child_assocs(
        &self,
        node: &NodeRef,
    ) -> Result<Vec<ChildAssoc>, VersionServiceError> {
        let children = self.store.child_assocs(node).await?;
        let mut assocs = Vec::new();
        for capture in children {
            // Peer captures live under their own association type.
            if capture.assoc_type == version2_model::assoc_versioned_assocs() {
                continue;
            }
            let props = self.store.properties(&capture.child).await?;
            let Some(target) = props
                .get(&content_model::prop_reference())
                .and_then(|v| v.as_node_ref())
                .cloned()
            else {
                continue;
            };
            if !self.store.exists(&target).await? {
                continue;
            }
            let is_primary = props
                .get(&version2_model::prop_is_primary())
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let nth_sibling = props
                .get(&version2_model::prop_nth_sibling())
                .and_then(|v| v.as_int())
                .unwrap_or(-1) as i32;
            assocs.push(ChildAssoc {
                parent: node.clone(),
                child: target,
                assoc_type: capture.assoc_type,
                qname: capture.qname,
                is_primary,
                nth_sibling,
            });
        }
        Ok(assocs)
    }

    async fn current_peer_assocs(
        &self,
        node: &NodeRef,
    ) -> Result<Vec<PeerAssoc>, VersionServiceError> {
        let captures = self
            .store
            .child_assocs_of_type(node, &version2_model::assoc_versioned_assocs())
            .await?;
        let mut assocs = Vec::with_capacity(captures.len());
        for capture in captures {
            let target = self
                .store
                .property(&capture.child, &content_model::prop_reference())
                .await?;
            let Some(target) = target.as_ref().and_then(|v| v.as_node_ref()).cloned() else {
                continue;
            };
            if !self.store.exists(&target).await? {
                continue;
            }
            // The capture's association qname carries the original peer
            // association type.
            assocs.push(PeerAssoc {
                source: node.clone(),
                target,
                assoc_type: capture.qname,
            });
        }
        Ok(assocs)
    }

    /// Swap a raw content reference for its descriptor; `None` means the
    /// property should be dropped.
    async fn resolve_content(
        &self,
        key: &QName,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, VersionServiceError> {
        match value {
            PropertyValue::ContentRef(content_ref) => {
                match self.content.lookup(content_ref).await? {
                    Some(data) => Ok(Some(PropertyValue::Content(data))),
                    None => {
                        tracing::warn!(
                            "content descriptor {content_ref} for frozen property {key} \
                             no longer resolves, dropping the property"
                        );
                        Ok(None)
                    }
                }
            }
            other => Ok(Some(other)),
        }
    }
}
