//! Schema Vocabulary
//!
//! The qualified names and store identities of the three models this crate
//! touches: the general content model (live nodes), the legacy version-store
//! schema (per-property child nodes) and the current version-store schema
//! (property map on the version node). A `SchemaDescriptor` bundles the names
//! that differ between the two version schemas so the history walk and the
//! migration engine can be written once.

use crate::models::{QName, StoreRef};

/// System namespace: node identity and structural names.
pub const NS_SYSTEM: &str = "sys";
/// Content model namespace: live-node properties and aspects.
pub const NS_CONTENT: &str = "content";
/// Legacy version-store namespace.
pub const NS_VERSION_LEGACY: &str = "version";
/// Current version-store namespace.
pub const NS_VERSION2: &str = "version2";

/// System model names (identity properties, structural associations).
pub mod system_model {
    use super::*;

    pub fn prop_node_uuid() -> QName {
        QName::new(NS_SYSTEM, "node-uuid")
    }

    pub fn prop_node_dbid() -> QName {
        QName::new(NS_SYSTEM, "node-dbid")
    }

    pub fn type_store_root() -> QName {
        QName::new(NS_SYSTEM, "store_root")
    }

    pub fn assoc_children() -> QName {
        QName::new(NS_SYSTEM, "children")
    }

    /// Relation name used for the simulated parent edge from a version node
    /// to its version-store root.
    pub fn assoc_versioned_state() -> QName {
        QName::new(NS_SYSTEM, "versionedState")
    }
}

/// Content model names (live-node properties and aspects).
pub mod content_model {
    use super::*;

    pub fn prop_name() -> QName {
        QName::new(NS_CONTENT, "name")
    }

    pub fn prop_created() -> QName {
        QName::new(NS_CONTENT, "created")
    }

    pub fn prop_creator() -> QName {
        QName::new(NS_CONTENT, "creator")
    }

    pub fn prop_modified() -> QName {
        QName::new(NS_CONTENT, "modified")
    }

    pub fn prop_modifier() -> QName {
        QName::new(NS_CONTENT, "modifier")
    }

    pub fn prop_accessed() -> QName {
        QName::new(NS_CONTENT, "accessed")
    }

    /// Version label of the current version, kept on the live node.
    pub fn prop_version_label() -> QName {
        QName::new(NS_CONTENT, "versionLabel")
    }

    /// Generic node-to-node reference property used by frozen association
    /// capture nodes.
    pub fn prop_reference() -> QName {
        QName::new(NS_CONTENT, "reference")
    }

    pub fn aspect_auditable() -> QName {
        QName::new(NS_CONTENT, "auditable")
    }

    pub fn aspect_versionable() -> QName {
        QName::new(NS_CONTENT, "versionable")
    }

    pub fn aspect_working_copy() -> QName {
        QName::new(NS_CONTENT, "workingcopy")
    }

    /// The auditable aspect's property set, in the order they are frozen.
    pub fn auditable_properties() -> Vec<QName> {
        vec![
            prop_created(),
            prop_creator(),
            prop_modified(),
            prop_modifier(),
            prop_accessed(),
        ]
    }
}

/// Legacy version-store schema: each frozen property and association is
/// materialized as its own child node of the version node.
pub mod legacy_model {
    use super::*;

    pub const STORE_ID: &str = "legacyVersionStore";

    pub fn store_ref() -> StoreRef {
        StoreRef::new("workspace", STORE_ID)
    }

    pub fn type_version_history() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionHistory")
    }

    pub fn type_version() -> QName {
        QName::new(NS_VERSION_LEGACY, "version")
    }

    pub fn type_versioned_property() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionedProperty")
    }

    pub fn type_versioned_child_assoc() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionedChildAssoc")
    }

    pub fn type_versioned_assoc() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionedAssoc")
    }

    pub fn type_version_metadata() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionMetaData")
    }

    pub fn assoc_version_histories() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionHistories")
    }

    pub fn assoc_versions() -> QName {
        QName::new(NS_VERSION_LEGACY, "versions")
    }

    pub fn assoc_versioned_attributes() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionedAttributes")
    }

    pub fn assoc_versioned_child_assocs() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionedChildAssocs")
    }

    pub fn assoc_versioned_assocs() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionedAssocs")
    }

    pub fn assoc_version_metadata() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionMetaData")
    }

    pub fn assoc_successor() -> QName {
        QName::new(NS_VERSION_LEGACY, "successor")
    }

    pub fn assoc_root_version() -> QName {
        QName::new(NS_VERSION_LEGACY, "rootVersion")
    }

    pub fn prop_versioned_node_id() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionedNodeId")
    }

    pub fn prop_version_label() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionLabel")
    }

    pub fn prop_version_number() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionNumber")
    }

    pub fn prop_version_description() -> QName {
        QName::new(NS_VERSION_LEGACY, "versionDescription")
    }

    pub fn prop_frozen_node_id() -> QName {
        QName::new(NS_VERSION_LEGACY, "frozenNodeId")
    }

    pub fn prop_frozen_node_store_protocol() -> QName {
        QName::new(NS_VERSION_LEGACY, "frozenNodeStoreProtocol")
    }

    pub fn prop_frozen_node_store_id() -> QName {
        QName::new(NS_VERSION_LEGACY, "frozenNodeStoreId")
    }

    pub fn prop_frozen_node_type() -> QName {
        QName::new(NS_VERSION_LEGACY, "frozenNodeType")
    }

    pub fn prop_frozen_aspects() -> QName {
        QName::new(NS_VERSION_LEGACY, "frozenAspects")
    }

    // Frozen-property capture node fields.

    pub fn prop_qname() -> QName {
        QName::new(NS_VERSION_LEGACY, "qname")
    }

    pub fn prop_value() -> QName {
        QName::new(NS_VERSION_LEGACY, "value")
    }

    pub fn prop_multi_value() -> QName {
        QName::new(NS_VERSION_LEGACY, "multiValue")
    }

    pub fn prop_is_multi_value() -> QName {
        QName::new(NS_VERSION_LEGACY, "isMultiValue")
    }

    // Frozen-association capture node fields.

    pub fn prop_assoc_qname() -> QName {
        QName::new(NS_VERSION_LEGACY, "assocQName")
    }

    pub fn prop_assoc_type_qname() -> QName {
        QName::new(NS_VERSION_LEGACY, "assocTypeQName")
    }

    pub fn prop_is_primary() -> QName {
        QName::new(NS_VERSION_LEGACY, "isPrimary")
    }

    pub fn prop_nth_sibling() -> QName {
        QName::new(NS_VERSION_LEGACY, "nthSibling")
    }

    pub fn prop_metadata_name() -> QName {
        QName::new(NS_VERSION_LEGACY, "metadataName")
    }

    pub fn prop_metadata_value() -> QName {
        QName::new(NS_VERSION_LEGACY, "metadataValue")
    }
}

/// Current version-store schema: the frozen property map lives directly on
/// the version node, metadata as prefixed properties.
pub mod version2_model {
    use super::*;

    pub const STORE_ID: &str = "versionStore2";

    /// Prefix for version metadata stored as properties of the version node.
    pub const METADATA_PREFIX: &str = "metadata-";

    pub fn store_ref() -> StoreRef {
        StoreRef::new("workspace", STORE_ID)
    }

    pub fn type_version_history() -> QName {
        QName::new(NS_VERSION2, "versionHistory")
    }

    pub fn type_versioned_child_assoc() -> QName {
        QName::new(NS_VERSION2, "versionedChildAssoc")
    }

    pub fn type_versioned_assoc() -> QName {
        QName::new(NS_VERSION2, "versionedAssoc")
    }

    pub fn aspect_version() -> QName {
        QName::new(NS_VERSION2, "version")
    }

    pub fn assoc_version_histories() -> QName {
        QName::new(NS_VERSION2, "versionHistories")
    }

    pub fn assoc_versions() -> QName {
        QName::new(NS_VERSION2, "versions")
    }

    pub fn assoc_versioned_assocs() -> QName {
        QName::new(NS_VERSION2, "versionedAssocs")
    }

    pub fn assoc_successor() -> QName {
        QName::new(NS_VERSION2, "successor")
    }

    pub fn assoc_root_version() -> QName {
        QName::new(NS_VERSION2, "rootVersion")
    }

    pub fn prop_versioned_node_id() -> QName {
        QName::new(NS_VERSION2, "versionedNodeId")
    }

    pub fn prop_version_label() -> QName {
        QName::new(NS_VERSION2, "versionLabel")
    }

    pub fn prop_version_description() -> QName {
        QName::new(NS_VERSION2, "versionDescription")
    }

    pub fn prop_frozen_node_ref() -> QName {
        QName::new(NS_VERSION2, "frozenNodeRef")
    }

    pub fn prop_frozen_node_dbid() -> QName {
        QName::new(NS_VERSION2, "frozenNodeDbId")
    }

    pub fn prop_frozen_created() -> QName {
        QName::new(NS_VERSION2, "frozenCreated")
    }

    pub fn prop_frozen_creator() -> QName {
        QName::new(NS_VERSION2, "frozenCreator")
    }

    pub fn prop_frozen_modified() -> QName {
        QName::new(NS_VERSION2, "frozenModified")
    }

    pub fn prop_frozen_modifier() -> QName {
        QName::new(NS_VERSION2, "frozenModifier")
    }

    pub fn prop_frozen_accessed() -> QName {
        QName::new(NS_VERSION2, "frozenAccessed")
    }

    // Association capture node fields (reference comes from the content
    // model).

    pub fn prop_is_primary() -> QName {
        QName::new(NS_VERSION2, "isPrimary")
    }

    pub fn prop_nth_sibling() -> QName {
        QName::new(NS_VERSION2, "nthSibling")
    }

    /// Metadata property key for a given metadata name.
    pub fn metadata_prop(name: &str) -> QName {
        QName::new(NS_VERSION2, format!("{}{}", METADATA_PREFIX, name))
    }
}

/// The names that differ between the two version schemas, bundled so chain
/// walking and history lookup can be schema-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    pub store: StoreRef,
    pub history_type: QName,
    pub assoc_version_histories: QName,
    pub assoc_versions: QName,
    pub assoc_successor: QName,
    pub assoc_root_version: QName,
    pub prop_versioned_node_id: QName,
    pub prop_version_label: QName,
    /// Whether history lookup is a name-indexed child lookup (current
    /// schema) or a scan of the root's children (legacy schema).
    pub lookup_history_by_name: bool,
}

impl SchemaDescriptor {
    pub fn legacy() -> Self {
        Self {
            store: legacy_model::store_ref(),
            history_type: legacy_model::type_version_history(),
            assoc_version_histories: legacy_model::assoc_version_histories(),
            assoc_versions: legacy_model::assoc_versions(),
            assoc_successor: legacy_model::assoc_successor(),
            assoc_root_version: legacy_model::assoc_root_version(),
            prop_versioned_node_id: legacy_model::prop_versioned_node_id(),
            prop_version_label: legacy_model::prop_version_label(),
            lookup_history_by_name: false,
        }
    }

    pub fn version2() -> Self {
        Self {
            store: version2_model::store_ref(),
            history_type: version2_model::type_version_history(),
            assoc_version_histories: version2_model::assoc_version_histories(),
            assoc_versions: version2_model::assoc_versions(),
            assoc_successor: version2_model::assoc_successor(),
            assoc_root_version: version2_model::assoc_root_version(),
            prop_versioned_node_id: version2_model::prop_versioned_node_id(),
            prop_version_label: version2_model::prop_version_label(),
            lookup_history_by_name: true,
        }
    }

    /// The same schema addressed through a tenant-scoped store.
    pub fn for_tenant(&self, tenant: &str) -> Self {
        Self {
            store: self.store.for_tenant(tenant),
            ..self.clone()
        }
    }
}
