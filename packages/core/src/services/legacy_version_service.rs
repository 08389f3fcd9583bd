//! Legacy Version Store Service
//!
//! Reads and writes the legacy physical schema, where every frozen property,
//! association and metadata entry of a version is materialized as its own
//! capture child node. New version data should be written through the current
//! schema; the freeze routine here survives because the migration and cleanup
//! paths are exercised against histories authored in this encoding, and
//! because existing installations keep producing them until migrated.

use crate::models::schema::{content_model, legacy_model};
use crate::models::{
    NodeRef, PropertyMap, PropertyValue, QName, SchemaDescriptor, StoreRef, Version,
    VersionHistory,
};
use crate::services::error::VersionServiceError;
use crate::services::history_builder::HistoryBuilder;
use crate::services::label;
use crate::store::NodeStore;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct LegacyVersionService {
    store: Arc<dyn NodeStore>,
    builder: HistoryBuilder,
}

impl LegacyVersionService {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self::with_schema(store, SchemaDescriptor::legacy())
    }

    /// Service over a tenant-scoped (or otherwise relocated) legacy store.
    pub fn with_schema(store: Arc<dyn NodeStore>, schema: SchemaDescriptor) -> Self {
        Self {
            store: store.clone(),
            builder: HistoryBuilder::new(store, schema),
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

    /// The version-history node for a live-node identifier, if any.
    pub async fn history_node_for(
        &self,
        node_id: &str,
    ) -> Result<Option<NodeRef>, VersionServiceError> {
        self.builder.history_node_for(node_id).await
    }

    /// Build the ordered version history held under `history_node`.
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

    /// Decode one legacy version node into its logical descriptor.
    pub async fn get_version(
        &self,
        version_node: &NodeRef,
    ) -> Result<Version, VersionServiceError> {
        let props = self.store.properties(version_node).await?;
        let label = props
            .get(&legacy_model::prop_version_label())
            .and_then(|v| v.as_text())
            .ok_or_else(|| {
                VersionServiceError::corrupt_history(format!(
                    "legacy version {version_node} has no label"
                ))
            })?
            .to_string();

        let versioned_node = self.frozen_node_target(&props, version_node)?;
        let description = props
            .get(&legacy_model::prop_version_description())
            .and_then(|v| v.as_text())
            .map(str::to_string);
        let created = props
            .get(&content_model::prop_created())
            .and_then(|v| v.as_timestamp());
        let metadata = self.version_metadata(version_node).await?;

        Ok(Version::new(version_node.clone(), versioned_node, label)
            .with_description(description)
            .with_created(created)
            .with_metadata(metadata))
    }

    /// Caller-supplied metadata entries recorded as capture children.
    pub async fn version_metadata(
        &self,
        version_node: &NodeRef,
    ) -> Result<BTreeMap<String, PropertyValue>, VersionServiceError> {
        let captures = self
            .store
            .child_assocs_of_type(version_node, &legacy_model::assoc_version_metadata())
            .await?;
        let mut metadata = BTreeMap::new();
        for capture in captures {
            let props = self.store.properties(&capture.child).await?;
            let name = props
                .get(&legacy_model::prop_metadata_name())
                .and_then(|v| v.as_text());
            let value = props.get(&legacy_model::prop_metadata_value());
            if let (Some(name), Some(value)) = (name, value) {
                metadata.insert(name.to_string(), value.clone());
            }
        }
        Ok(metadata)
    }

    /// Recover the live-node reference a history describes, from its first
    /// version child. All versions of a history refer to the same live node.
    pub async fn versioned_node_of(
        &self,
        history_node: &NodeRef,
    ) -> Result<Option<NodeRef>, VersionServiceError> {
        let versions = self.builder.version_assocs(history_node).await?;
        let Some(first) = versions.first() else {
            return Ok(None);
        };
        let props = self.store.properties(&first.child).await?;
        Ok(Some(self.frozen_node_target(&props, &first.child)?))
    }

    /// Whether this history captured a versioned working copy (possible in
    /// very old data); such histories are not migrated.
    pub async fn is_versioned_working_copy(
        &self,
        history_node: &NodeRef,
    ) -> Result<bool, VersionServiceError> {
        let versions = self.builder.version_assocs(history_node).await?;
        let Some(first) = versions.first() else {
            return Ok(false);
        };
        let aspects = self
            .store
            .property(&first.child, &legacy_model::prop_frozen_aspects())
            .await?;
        let Some(PropertyValue::Multi(values)) = aspects else {
            return Ok(false);
        };
        let has = |name: &QName| {
            values
                .iter()
                .any(|v| v.as_name().map(|n| n == name).unwrap_or(false))
        };
        Ok(has(&content_model::aspect_working_copy())
            && has(&content_model::aspect_versionable()))
    }

    /// Delete a whole legacy version history.
    pub async fn delete_version_history(
        &self,
        history_node: &NodeRef,
    ) -> Result<(), VersionServiceError> {
        Ok(self.store.delete_node(history_node).await?)
    }

    //
    // LEGACY FREEZE (fixture/compat writer)
    //

    /// Snapshot a live node into the legacy schema.
    ///
    /// Creates the history on first use, freezes the node's type, aspects,
    /// properties and associations as capture children, links the new version
    /// behind the current one, and moves the live node's version label
    /// forward.
    pub async fn create_version(
        &self,
        live_node: &NodeRef,
        metadata: BTreeMap<String, PropertyValue>,
    ) -> Result<Version, VersionServiceError> {
        let schema = self.builder.schema().clone();
        let history_node = match self.history_node_for(live_node.id()).await? {
            Some(node) => node,
            None => self.create_history_node(live_node).await?,
        };

        let live_label = self
            .store
            .property(live_node, &content_model::prop_version_label())
            .await?;
        let current = match live_label.as_ref().and_then(|v| v.as_text()) {
            Some(current_label) => {
                let node = self
                    .builder
                    .version_node_by_label(&history_node, current_label)
                    .await?
                    .ok_or_else(|| {
                        VersionServiceError::version_not_found(format!(
                            "no version labelled '{current_label}' for {live_node}"
                        ))
                    })?;
                // Appending anywhere but the head would branch the history.
                let successors = self
                    .store
                    .target_assocs(&node, Some(&schema.assoc_successor))
                    .await?;
                if !successors.is_empty() {
                    return Err(VersionServiceError::BranchingDetected { node });
                }
                Some(node)
            }
            None => None,
        };

        let previous_label = live_label.as_ref().and_then(|v| v.as_text());
        let next_label = label::next_label(previous_label, &metadata);
        let version_count = self.builder.version_assocs(&history_node).await?.len();

        let live_type = self.store.node_type(live_node).await?;
        let live_aspects = self.store.aspects(live_node).await?;
        let live_props = self.store.properties(live_node).await?;

        let mut standard = PropertyMap::new();
        standard.insert(
            legacy_model::prop_version_label(),
            PropertyValue::from(next_label.clone()),
        );
        standard.insert(
            legacy_model::prop_version_number(),
            PropertyValue::Int(version_count as i64 + 1),
        );
        standard.insert(
            legacy_model::prop_frozen_node_id(),
            PropertyValue::from(live_node.id()),
        );
        standard.insert(
            legacy_model::prop_frozen_node_store_protocol(),
            PropertyValue::from(live_node.store().protocol()),
        );
        standard.insert(
            legacy_model::prop_frozen_node_store_id(),
            PropertyValue::from(live_node.store().identifier()),
        );
        standard.insert(
            legacy_model::prop_frozen_node_type(),
            PropertyValue::Name(live_type),
        );
        standard.insert(
            legacy_model::prop_frozen_aspects(),
            PropertyValue::Multi(
                live_aspects
                    .iter()
                    .cloned()
                    .map(PropertyValue::Name)
                    .collect(),
            ),
        );

        let version_node = self
            .store
            .create_node(
                &history_node,
                &schema.assoc_versions,
                &QName::new(
                    crate::models::schema::NS_VERSION_LEGACY,
                    format!("version-{next_label}"),
                ),
                &legacy_model::type_version(),
                standard,
            )
            .await?
            .child;

        self.freeze_properties(&version_node, &live_props).await?;
        self.freeze_child_assocs(&version_node, live_node).await?;
        self.freeze_peer_assocs(&version_node, live_node).await?;
        self.store_metadata(&version_node, &metadata).await?;

        match current {
            Some(current) => {
                self.store
                    .create_association(&current, &version_node, &schema.assoc_successor)
                    .await?;
            }
            None => {
                self.store
                    .create_association(&history_node, &version_node, &schema.assoc_root_version)
                    .await?;
            }
        }

        self.store
            .set_property(
                live_node,
                &content_model::prop_version_label(),
                PropertyValue::from(next_label),
            )
            .await?;

        self.get_version(&version_node).await
    }

    async fn create_history_node(
        &self,
        live_node: &NodeRef,
    ) -> Result<NodeRef, VersionServiceError> {
        let schema = self.builder.schema();
        let root = self.root_node().await?;
        let mut props = PropertyMap::new();
        props.insert(
            content_model::prop_name(),
            PropertyValue::from(live_node.id()),
        );
        props.insert(
            legacy_model::prop_versioned_node_id(),
            PropertyValue::from(live_node.id()),
        );
        Ok(self
            .store
            .create_node(
                &root,
                &schema.assoc_version_histories,
                &QName::new(crate::models::schema::NS_VERSION_LEGACY, live_node.id()),
                &legacy_model::type_version_history(),
                props,
            )
            .await?
            .child)
    }

    async fn freeze_properties(
        &self,
        version_node: &NodeRef,
        live_props: &PropertyMap,
    ) -> Result<(), VersionServiceError> {
        for (key, value) in live_props {
            let mut props = PropertyMap::new();
            props.insert(legacy_model::prop_qname(), PropertyValue::Name(key.clone()));
            if value.is_multi() {
                props.insert(legacy_model::prop_multi_value(), value.clone());
                props.insert(legacy_model::prop_is_multi_value(), PropertyValue::Bool(true));
            } else {
                props.insert(legacy_model::prop_value(), value.clone());
                props.insert(
                    legacy_model::prop_is_multi_value(),
                    PropertyValue::Bool(false),
                );
            }
            self.store
                .create_node(
                    version_node,
                    &legacy_model::assoc_versioned_attributes(),
                    &legacy_model::assoc_versioned_attributes(),
                    &legacy_model::type_versioned_property(),
                    props,
                )
                .await?;
        }
        Ok(())
    }

    async fn freeze_child_assocs(
        &self,
        version_node: &NodeRef,
        live_node: &NodeRef,
    ) -> Result<(), VersionServiceError> {
        for assoc in self.store.child_assocs(live_node).await? {
            let mut props = PropertyMap::new();
            props.insert(
                legacy_model::prop_assoc_qname(),
                PropertyValue::Name(assoc.qname.clone()),
            );
            props.insert(
                legacy_model::prop_assoc_type_qname(),
                PropertyValue::Name(assoc.assoc_type.clone()),
            );
            props.insert(
                legacy_model::prop_is_primary(),
                PropertyValue::Bool(assoc.is_primary),
            );
            props.insert(
                legacy_model::prop_nth_sibling(),
                PropertyValue::Int(assoc.nth_sibling as i64),
            );
            props.insert(
                content_model::prop_reference(),
                PropertyValue::Ref(assoc.child.clone()),
            );
            self.store
                .create_node(
                    version_node,
                    &legacy_model::assoc_versioned_child_assocs(),
                    &legacy_model::assoc_versioned_child_assocs(),
                    &legacy_model::type_versioned_child_assoc(),
                    props,
                )
                .await?;
        }
        Ok(())
    }

    async fn freeze_peer_assocs(
        &self,
        version_node: &NodeRef,
        live_node: &NodeRef,
    ) -> Result<(), VersionServiceError> {
        for assoc in self.store.target_assocs(live_node, None).await? {
            let mut props = PropertyMap::new();
            props.insert(
                legacy_model::prop_assoc_type_qname(),
                PropertyValue::Name(assoc.assoc_type.clone()),
            );
            props.insert(
                content_model::prop_reference(),
                PropertyValue::Ref(assoc.target.clone()),
            );
            self.store
                .create_node(
                    version_node,
                    &legacy_model::assoc_versioned_assocs(),
                    &legacy_model::assoc_versioned_assocs(),
                    &legacy_model::type_versioned_assoc(),
                    props,
                )
                .await?;
        }
        Ok(())
    }

    async fn store_metadata(
        &self,
        version_node: &NodeRef,
        metadata: &BTreeMap<String, PropertyValue>,
    ) -> Result<(), VersionServiceError> {
        for (name, value) in metadata {
            let mut props = PropertyMap::new();
            props.insert(
                legacy_model::prop_metadata_name(),
                PropertyValue::from(name.clone()),
            );
            props.insert(legacy_model::prop_metadata_value(), value.clone());
            self.store
                .create_node(
                    version_node,
                    &legacy_model::assoc_version_metadata(),
                    &legacy_model::assoc_version_metadata(),
                    &legacy_model::type_version_metadata(),
                    props,
                )
                .await?;
        }
        Ok(())
    }

    fn frozen_node_target(
        &self,
        props: &PropertyMap,
        version_node: &NodeRef,
    ) -> Result<NodeRef, VersionServiceError> {
        let id = props
            .get(&legacy_model::prop_frozen_node_id())
            .and_then(|v| v.as_text());
        let protocol = props
            .get(&legacy_model::prop_frozen_node_store_protocol())
            .and_then(|v| v.as_text());
        let store_id = props
            .get(&legacy_model::prop_frozen_node_store_id())
            .and_then(|v| v.as_text());
        match (id, protocol, store_id) {
            (Some(id), Some(protocol), Some(store_id)) => Ok(NodeRef::new(
                StoreRef::new(protocol, store_id),
                id,
            )),
            _ => Err(VersionServiceError::corrupt_history(format!(
                "legacy version {version_node} is missing its frozen node reference"
            ))),
        }
    }
}
