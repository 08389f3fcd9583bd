//! Version History Builder
//!
//! Reconstructs the ordered version chain for one live node from either
//! physical schema. The walk itself is schema-agnostic: everything that
//! differs between the two encodings (store identity, container and link
//! names, label property) comes in through the [`SchemaDescriptor`].
//!
//! Locating the chain start depends on whether the live node still exists:
//! if it does, its recorded version label identifies the current version; if
//! it does not, the head is found by walking successor links forward from any
//! version. The chain is then accumulated backward through predecessor links,
//! root first. A version with more than one successor is a branching fault -
//! loud by design, because well-formed histories never branch.

use crate::models::schema::content_model;
use crate::models::{NodeRef, SchemaDescriptor};
use crate::services::error::VersionServiceError;
use crate::store::NodeStore;
use std::sync::Arc;

pub struct HistoryBuilder {
    store: Arc<dyn NodeStore>,
    schema: SchemaDescriptor,
}

impl HistoryBuilder {
    pub fn new(store: Arc<dyn NodeStore>, schema: SchemaDescriptor) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Root node of this schema's version store.
    pub async fn root_node(&self) -> Result<NodeRef, VersionServiceError> {
        Ok(self.store.root_node(&self.schema.store).await?)
    }

    /// Locate the version-history node for a live-node identifier, if one
    /// exists.
    pub async fn history_node_for(
        &self,
        node_id: &str,
    ) -> Result<Option<NodeRef>, VersionServiceError> {
        let root = self.root_node().await?;
        if self.schema.lookup_history_by_name {
            return Ok(self
                .store
                .child_by_name(&root, &self.schema.assoc_version_histories, node_id)
                .await?);
        }
        // Legacy layout has no name index; scan the root's histories.
        let histories = self
            .store
            .child_assocs_of_type(&root, &self.schema.assoc_version_histories)
            .await?;
        for assoc in histories {
            let versioned_id = self
                .store
                .property(&assoc.child, &self.schema.prop_versioned_node_id)
                .await?;
            if versioned_id.as_ref().and_then(|v| v.as_text()) == Some(node_id) {
                return Ok(Some(assoc.child));
            }
        }
        Ok(None)
    }

    /// The version node whose label matches the live node's recorded label.
    pub async fn version_node_by_label(
        &self,
        history_node: &NodeRef,
        label: &str,
    ) -> Result<Option<NodeRef>, VersionServiceError> {
        for assoc in self.version_assocs(history_node).await? {
            let version_label = self
                .store
                .property(&assoc.child, &self.schema.prop_version_label)
                .await?;
            if version_label.as_ref().and_then(|v| v.as_text()) == Some(label) {
                return Ok(Some(assoc.child));
            }
        }
        Ok(None)
    }

    /// Version children of a history node, in creation order.
    pub async fn version_assocs(
        &self,
        history_node: &NodeRef,
    ) -> Result<Vec<crate::models::ChildAssoc>, VersionServiceError> {
        Ok(self
            .store
            .child_assocs_of_type(history_node, &self.schema.assoc_versions)
            .await?)
    }

    /// The ordered chain of version nodes for one history, root (oldest)
    /// first.
    ///
    /// # Errors
    ///
    /// - `BranchingDetected` if any version carries more than one successor
    ///   link
    /// - `CorruptHistory` on multiple predecessors or a successor cycle
    /// - `VersionNotFound` if the live node's label matches no version
    pub async fn ordered_version_nodes(
        &self,
        history_node: &NodeRef,
        versioned_node: &NodeRef,
    ) -> Result<Vec<NodeRef>, VersionServiceError> {
        let versions = self.version_assocs(history_node).await?;
        if versions.is_empty() {
            return Ok(Vec::new());
        }

        let start = self.locate_chain_start(&versions, versioned_node).await?;

        // Walk backward through predecessor links, accumulating root-first.
        let mut chain = vec![start.clone()];
        let mut cursor = start;
        loop {
            if chain.len() > versions.len() {
                return Err(VersionServiceError::corrupt_history(format!(
                    "predecessor cycle in {history_node}"
                )));
            }
            let predecessors = self
                .store
                .source_assocs(&cursor, Some(&self.schema.assoc_successor))
                .await?;
            match predecessors.as_slice() {
                [] => break,
                [link] => {
                    let predecessor = link.source.clone();
                    self.check_no_branch(&predecessor).await?;
                    chain.insert(0, predecessor.clone());
                    cursor = predecessor;
                }
                _ => {
                    return Err(VersionServiceError::corrupt_history(format!(
                        "version {cursor} has {} predecessors",
                        predecessors.len()
                    )));
                }
            }
        }
        Ok(chain)
    }

    /// Find the newest version: by live label when the live node exists,
    /// otherwise by walking successor links forward until none remain.
    async fn locate_chain_start(
        &self,
        versions: &[crate::models::ChildAssoc],
        versioned_node: &NodeRef,
    ) -> Result<NodeRef, VersionServiceError> {
        if self.store.exists(versioned_node).await? {
            let live_label = self
                .store
                .property(versioned_node, &content_model::prop_version_label())
                .await?;
            if let Some(label) = live_label.as_ref().and_then(|v| v.as_text()) {
                for assoc in versions {
                    let version_label = self
                        .store
                        .property(&assoc.child, &self.schema.prop_version_label)
                        .await?;
                    if version_label.as_ref().and_then(|v| v.as_text()) == Some(label) {
                        return Ok(assoc.child.clone());
                    }
                }
                return Err(VersionServiceError::version_not_found(format!(
                    "no version labelled '{label}' for {versioned_node}"
                )));
            }
        }
        self.head_by_forward_walk(versions).await
    }

    async fn head_by_forward_walk(
        &self,
        versions: &[crate::models::ChildAssoc],
    ) -> Result<NodeRef, VersionServiceError> {
        let mut cursor = versions[0].child.clone();
        let mut steps = 0;
        loop {
            if steps > versions.len() {
                return Err(VersionServiceError::corrupt_history(format!(
                    "successor cycle at {cursor}"
                )));
            }
            let successors = self
                .store
                .target_assocs(&cursor, Some(&self.schema.assoc_successor))
                .await?;
            match successors.as_slice() {
                [] => return Ok(cursor),
                [link] => {
                    cursor = link.target.clone();
                    steps += 1;
                }
                _ => return Err(VersionServiceError::BranchingDetected { node: cursor }),
            }
        }
    }

    async fn check_no_branch(&self, version_node: &NodeRef) -> Result<(), VersionServiceError> {
        let successors = self
            .store
            .target_assocs(version_node, Some(&self.schema.assoc_successor))
            .await?;
        if successors.len() > 1 {
            return Err(VersionServiceError::BranchingDetected {
                node: version_node.clone(),
            });
        }
        Ok(())
    }
}
