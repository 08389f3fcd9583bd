//! Current Version Store Service
//!
//! Creation primitives and reads for the current physical schema: the frozen
//! property map lives directly on the version node, version bookkeeping in a
//! dedicated aspect, metadata as prefixed properties, and associations as
//! capture children keyed by their original names.
//!
//! The freeze routine ([`VersionService::create_frozen_version`]) is shared
//! by the ordinary snapshot path and the migration engine: both assemble a
//! [`PendingNodeState`] and hand it over, which is what guarantees migrated
//! versions are indistinguishable from natively created ones.

use crate::models::schema::{content_model, system_model, version2_model, NS_VERSION2};
use crate::models::{
    Dictionary, NodeRef, PropertyMap, PropertyValue, QName, SchemaDescriptor, StoreRef, Version,
    VersionHistory,
};
use crate::services::error::VersionServiceError;
use crate::services::history_builder::HistoryBuilder;
use crate::services::label;
use crate::services::pending::PendingNodeState;
use crate::store::NodeStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata key whose value becomes the version's description.
pub const META_DESCRIPTION: &str = "description";

pub struct VersionService {
    store: Arc<dyn NodeStore>,
    builder: HistoryBuilder,
    dictionary: Arc<Dictionary>,
}

impl VersionService {
    pub fn new(store: Arc<dyn NodeStore>, dictionary: Arc<Dictionary>) -> Self {
        Self::with_schema(store, dictionary, SchemaDescriptor::version2())
    }

    /// Service over a tenant-scoped (or otherwise relocated) store.
    pub fn with_schema(
        store: Arc<dyn NodeStore>,
        dictionary: Arc<Dictionary>,
        schema: SchemaDescriptor,
    ) -> Self {
        Self {
            store: store.clone(),
            builder: HistoryBuilder::new(store, schema),
            dictionary,
        }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        self.builder.schema()
    }

    pub fn store_ref(&self) -> &StoreRef {
        &self.builder.schema().store
    }

    pub async fn root_node(&self) -> Result<NodeRef, VersionServiceError> {
        self.builder.root_node().await
    }

    pub async fn history_node_for(
        &self,
        node_id: &str,
    ) -> Result<Option<NodeRef>, VersionServiceError> {
        self.builder.history_node_for(node_id).await
    }

    /// Whether the node is itself a version node in this store.
    pub async fn is_a_version(&self, node: &NodeRef) -> Result<bool, VersionServiceError> {
        if node.store() != self.store_ref() {
            return Ok(false);
        }
        Ok(self
            .store
            .has_aspect(node, &version2_model::aspect_version())
            .await?)
    }

    /// Whether a version history exists for the live node.
    pub async fn is_versioned(&self, live_node: &NodeRef) -> Result<bool, VersionServiceError> {
        Ok(self.history_node_for(live_node.id()).await?.is_some())
    }

    //
    // CREATION
    //

    /// Create an (empty) version-history node for a live node.
    ///
    /// The history is name-indexed under the store root by the live node's
    /// identifier.
    pub async fn create_version_history(
        &self,
        versioned_node: &NodeRef,
    ) -> Result<NodeRef, VersionServiceError> {
        let schema = self.builder.schema();
        let root = self.root_node().await?;
        let mut props = PropertyMap::new();
        props.insert(
            content_model::prop_name(),
            PropertyValue::from(versioned_node.id()),
        );
        props.insert(
            version2_model::prop_versioned_node_id(),
            PropertyValue::from(versioned_node.id()),
        );
        let history = self
            .store
            .create_node(
                &root,
                &schema.assoc_version_histories,
                &QName::new(NS_VERSION2, versioned_node.id()),
                &version2_model::type_version_history(),
                props,
            )
            .await?
            .child;
        tracing::trace!("created version history {history} for {versioned_node}");
        Ok(history)
    }

    /// Ordinary snapshot path: freeze the live node's current state as the
    /// next version in its history.
    pub async fn create_version(
        &self,
        live_node: &NodeRef,
        mut metadata: BTreeMap<String, PropertyValue>,
    ) -> Result<Version, VersionServiceError> {
        let history_node = match self.history_node_for(live_node.id()).await? {
            Some(node) => {
                // Existing history: the live label must locate the head, or
                // appending would branch.
                self.current_version_node(&node, live_node).await?;
                node
            }
            None => self.create_version_history(live_node).await?,
        };

        let previous_label = self
            .store
            .property(live_node, &content_model::prop_version_label())
            .await?;
        let next_label = label::next_label(
            previous_label.as_ref().and_then(|v| v.as_text()),
            &metadata,
        );
        let description = metadata
            .remove(META_DESCRIPTION)
            .and_then(|v| v.as_text().map(str::to_string));

        // Assemble the pending state from the live node.
        let node_type = self.store.node_type(live_node).await?;
        let live_props = self.store.properties(live_node).await?;
        let mut pending = PendingNodeState::new(node_type.clone());
        for (key, value) in &live_props {
            pending.add_property(&node_type, key.clone(), value.clone());
        }
        for aspect in self.store.aspects(live_node).await? {
            if let Some(keys) = self.dictionary.properties_of(&aspect) {
                for key in keys {
                    if let Some(value) = live_props.get(key) {
                        pending.add_property(&aspect, key.clone(), value.clone());
                    }
                }
            }
            pending.add_aspect(aspect);
        }
        for assoc in self.store.child_assocs(live_node).await? {
            pending.add_child_assoc(assoc);
        }
        for assoc in self.store.target_assocs(live_node, None).await? {
            pending.add_peer_assoc(assoc);
        }

        let db_id = live_props
            .get(&system_model::prop_node_dbid())
            .and_then(|v| v.as_int())
            .unwrap_or_default();
        let standard = self.standard_version_properties(
            live_node,
            db_id,
            &next_label,
            description.as_deref(),
        );

        let version_node = self
            .create_frozen_version(&history_node, &pending, standard, &metadata)
            .await?;

        // Move the live label forward without churning the live node's own
        // audit fields.
        {
            let _pause = self.store.audit().pause();
            self.store
                .set_property(
                    live_node,
                    &content_model::prop_version_label(),
                    PropertyValue::from(next_label),
                )
                .await?;
        }

        self.get_version(&version_node).await
    }

    /// The standard version bookkeeping property set.
    pub fn standard_version_properties(
        &self,
        versioned_node: &NodeRef,
        frozen_db_id: i64,
        version_label: &str,
        description: Option<&str>,
    ) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(
            version2_model::prop_version_label(),
            PropertyValue::from(version_label),
        );
        if let Some(description) = description {
            props.insert(
                version2_model::prop_version_description(),
                PropertyValue::from(description),
            );
        }
        props.insert(
            version2_model::prop_frozen_node_ref(),
            PropertyValue::Ref(versioned_node.clone()),
        );
        props.insert(
            version2_model::prop_frozen_node_dbid(),
            PropertyValue::Int(frozen_db_id),
        );
        props
    }

    /// The freeze routine: create the version node from a pending state,
    /// attach the version aspect and metadata, capture associations, and
    /// link the new version behind the history's head.
    pub async fn create_frozen_version(
        &self,
        history_node: &NodeRef,
        pending: &PendingNodeState,
        standard: PropertyMap,
        metadata: &BTreeMap<String, PropertyValue>,
    ) -> Result<NodeRef, VersionServiceError> {
        let schema = self.builder.schema();
        let prior = self.builder.version_assocs(history_node).await?;

        let version_node = self
            .store
            .create_node(
                history_node,
                &schema.assoc_versions,
                &QName::new(NS_VERSION2, format!("version-{}", prior.len())),
                pending.node_type(),
                pending.type_properties(),
            )
            .await?
            .child;

        self.store
            .add_aspect(&version_node, &version2_model::aspect_version(), standard)
            .await?;

        for (name, value) in metadata {
            self.store
                .set_property(
                    &version_node,
                    &version2_model::metadata_prop(name),
                    value.clone(),
                )
                .await?;
        }

        // The frozen auditable fields of the source node keep their own
        // keys; the version node's bare audit fields describe the version
        // itself.
        let type_props = pending.type_properties();
        for (original, frozen) in frozen_audit_pairs() {
            if let Some(value) = type_props.get(&original) {
                self.store
                    .set_property(&version_node, &frozen, value.clone())
                    .await?;
            }
        }

        for aspect in pending.aspects() {
            let props = if aspect == &content_model::aspect_auditable() {
                PropertyMap::new()
            } else {
                pending.class_properties(aspect)
            };
            self.store.add_aspect(&version_node, aspect, props).await?;
        }

        for assoc in pending.child_assocs() {
            let mut props = PropertyMap::new();
            props.insert(
                content_model::prop_reference(),
                PropertyValue::Ref(assoc.child.clone()),
            );
            props.insert(
                version2_model::prop_is_primary(),
                PropertyValue::Bool(assoc.is_primary),
            );
            props.insert(
                version2_model::prop_nth_sibling(),
                PropertyValue::Int(assoc.nth_sibling as i64),
            );
            self.store
                .create_node(
                    &version_node,
                    &assoc.assoc_type,
                    &assoc.qname,
                    &version2_model::type_versioned_child_assoc(),
                    props,
                )
                .await?;
        }

        for assoc in pending.peer_assocs() {
            let mut props = PropertyMap::new();
            props.insert(
                content_model::prop_reference(),
                PropertyValue::Ref(assoc.target.clone()),
            );
            self.store
                .create_node(
                    &version_node,
                    &version2_model::assoc_versioned_assocs(),
                    &assoc.assoc_type,
                    &version2_model::type_versioned_assoc(),
                    props,
                )
                .await?;
        }

        // Forward successor link from the previous head, or the root-version
        // link for a first version.
        match prior.last() {
            Some(head) => {
                self.store
                    .create_association(&head.child, &version_node, &schema.assoc_successor)
                    .await?;
            }
            None => {
                self.store
                    .create_association(history_node, &version_node, &schema.assoc_root_version)
                    .await?;
            }
        }

        tracing::trace!("created version node {version_node} under {history_node}");
        Ok(version_node)
    }

    //
    // READS
    //

    pub async fn version_history(
        &self,
        live_node: &NodeRef,
    ) -> Result<Option<VersionHistory>, VersionServiceError> {
        let Some(history_node) = self.history_node_for(live_node.id()).await? else {
            return Ok(None);
        };
        Ok(Some(
            self.build_version_history(&history_node, live_node).await?,
        ))
    }

    pub async fn build_version_history(
        &self,
        history_node: &NodeRef,
        versioned_node: &NodeRef,
    ) -> Result<VersionHistory, VersionServiceError> {
        let nodes = self
            .builder
            .ordered_version_nodes(history_node, versioned_node)
            .await?;
        let mut versions = Vec::with_capacity(nodes.len());
        for node in nodes {
            versions.push(self.get_version(&node).await?);
        }
        Ok(VersionHistory::new(versions))
    }

    /// Decode one version node into its logical descriptor.
    pub async fn get_version(
        &self,
        version_node: &NodeRef,
    ) -> Result<Version, VersionServiceError> {
        let props = self.store.properties(version_node).await?;
        let label = props
            .get(&version2_model::prop_version_label())
            .and_then(|v| v.as_text())
            .ok_or_else(|| {
                VersionServiceError::corrupt_history(format!(
                    "version {version_node} has no label"
                ))
            })?
            .to_string();
        let versioned_node = props
            .get(&version2_model::prop_frozen_node_ref())
            .and_then(|v| v.as_node_ref())
            .cloned()
            .ok_or_else(|| {
                VersionServiceError::corrupt_history(format!(
                    "version {version_node} has no frozen node reference"
                ))
            })?;
        let description = props
            .get(&version2_model::prop_version_description())
            .and_then(|v| v.as_text())
            .map(str::to_string);
        let created = props
            .get(&content_model::prop_created())
            .and_then(|v| v.as_timestamp());

        let mut metadata = BTreeMap::new();
        for (key, value) in &props {
            if !key.is_in(NS_VERSION2) {
                continue;
            }
            if let Some(name) = key.local_name().strip_prefix(version2_model::METADATA_PREFIX) {
                metadata.insert(name.to_string(), value.clone());
            }
        }

        Ok(Version::new(version_node.clone(), versioned_node, label)
            .with_description(description)
            .with_created(created)
            .with_metadata(metadata))
    }

    /// The live node's current version.
    pub async fn current_version(
        &self,
        live_node: &NodeRef,
    ) -> Result<Option<Version>, VersionServiceError> {
        let Some(history_node) = self.history_node_for(live_node.id()).await? else {
            return Ok(None);
        };
        let node = self.current_version_node(&history_node, live_node).await?;
        Ok(Some(self.get_version(&node).await?))
    }

    /// Locate the current version by the live node's label and verify it is
    /// the head of the chain - anything else means the history is corrupt.
    async fn current_version_node(
        &self,
        history_node: &NodeRef,
        live_node: &NodeRef,
    ) -> Result<NodeRef, VersionServiceError> {
        let live_label = self
            .store
            .property(live_node, &content_model::prop_version_label())
            .await?;
        let live_label = live_label.as_ref().and_then(|v| v.as_text()).ok_or_else(|| {
            VersionServiceError::version_not_found(format!(
                "live node {live_node} has a history but no version label"
            ))
        })?;

        let versions = self.builder.version_assocs(history_node).await?;
        let last_index = versions.len().saturating_sub(1);
        for (index, assoc) in versions.iter().enumerate() {
            let version_label = self
                .store
                .property(&assoc.child, &self.builder.schema().prop_version_label)
                .await?;
            if version_label.as_ref().and_then(|v| v.as_text()) == Some(live_label) {
                if index != last_index {
                    return Err(VersionServiceError::corrupt_history(format!(
                        "current version '{live_label}' of {live_node} is not the head of {history_node}"
                    )));
                }
                return Ok(assoc.child.clone());
            }
        }
        Err(VersionServiceError::version_not_found(format!(
            "no version labelled '{live_label}' for {live_node}"
        )))
    }

    //
    // MAINTENANCE
    //

    /// Narrow correction path for corrupted version labels: when the live
    /// node's label is the invalid `"0"`, re-derive serial labels across the
    /// chain (ordered by frozen modification time, then node db-id) without
    /// touching chain order. Returns the number of versions relabelled.
    pub async fn repair_version_labels(
        &self,
        live_node: &NodeRef,
    ) -> Result<usize, VersionServiceError> {
        let live_label = self
            .store
            .property(live_node, &content_model::prop_version_label())
            .await?;
        if live_label.as_ref().and_then(|v| v.as_text()) != Some("0") {
            return Ok(0);
        }
        let Some(history_node) = self.history_node_for(live_node.id()).await? else {
            return Ok(0);
        };

        let mut versions = Vec::new();
        for assoc in self.builder.version_assocs(&history_node).await? {
            let props = self.store.properties(&assoc.child).await?;
            let modified = props
                .get(&version2_model::prop_frozen_modified())
                .and_then(|v| v.as_timestamp());
            let db_id = props
                .get(&system_model::prop_node_dbid())
                .and_then(|v| v.as_int())
                .unwrap_or_default();
            versions.push((assoc.child, modified, db_id));
        }
        versions.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let mut previous: Option<String> = None;
        for (version_node, _, _) in &versions {
            let metadata = self.get_version(version_node).await?.metadata().clone();
            let relabel = label::next_label(previous.as_deref(), &metadata);
            self.store
                .set_property(
                    version_node,
                    &version2_model::prop_version_label(),
                    PropertyValue::from(relabel.clone()),
                )
                .await?;
            previous = Some(relabel);
        }

        if let Some(final_label) = previous.clone() {
            let _pause = self.store.audit().pause();
            self.store
                .set_property(
                    live_node,
                    &content_model::prop_version_label(),
                    PropertyValue::from(final_label),
                )
                .await?;
        }
        tracing::warn!(
            "repaired {} corrupted version labels for {live_node}",
            versions.len()
        );
        Ok(versions.len())
    }

    /// Delete the live node's whole version history and clear its label.
    pub async fn delete_version_history(
        &self,
        live_node: &NodeRef,
    ) -> Result<(), VersionServiceError> {
        let Some(history_node) = self.history_node_for(live_node.id()).await? else {
            return Err(VersionServiceError::history_not_found(live_node.id()));
        };
        self.store.delete_node(&history_node).await?;
        if self.store.exists(live_node).await? {
            let _pause = self.store.audit().pause();
            self.store
                .remove_property(live_node, &content_model::prop_version_label())
                .await?;
        }
        Ok(())
    }
}

fn frozen_audit_pairs() -> [(QName, QName); 5] {
    [
        (content_model::prop_created(), version2_model::prop_frozen_created()),
        (content_model::prop_creator(), version2_model::prop_frozen_creator()),
        (content_model::prop_modified(), version2_model::prop_frozen_modified()),
        (content_model::prop_modifier(), version2_model::prop_frozen_modifier()),
        (content_model::prop_accessed(), version2_model::prop_frozen_accessed()),
    ]
}
