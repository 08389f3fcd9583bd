//! In-Memory Node Store
//!
//! Reference implementation of [`NodeStore`] backing the test suite and
//! embedded use. Semantics worth knowing:
//!
//! - Nodes are keyed by full [`NodeRef`], so the same identifier can exist in
//!   two stores at once (exactly what identifier carry-over across migration
//!   produces).
//! - The ambient transaction is a whole-state snapshot: `begin` captures it,
//!   `rollback` restores it, `commit` discards it. One at a time.
//! - Auditable properties are stamped automatically while the audit switch is
//!   enabled; a paused switch lets caller-supplied values through untouched.
//! - Test seams: a transient-failure injector, a per-node delete veto, and a
//!   mutating-call counter.

use crate::models::schema::{content_model, system_model};
use crate::models::{
    ChildAssoc, ContentData, NodeRef, PeerAssoc, PropertyMap, PropertyValue, QName, StoreRef,
};
use crate::store::audit::AuditSwitch;
use crate::store::error::StoreError;
use crate::store::node_store::{ContentMetadataStore, NodeStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
struct NodeRecord {
    node_type: QName,
    aspects: BTreeSet<QName>,
    properties: PropertyMap,
    parent: Option<ChildAssoc>,
    children: Vec<ChildAssoc>,
}

#[derive(Debug, Clone, Default)]
struct State {
    roots: HashMap<StoreRef, NodeRef>,
    nodes: HashMap<NodeRef, NodeRecord>,
    peer_assocs: Vec<PeerAssoc>,
    next_db_id: i64,
}

/// In-memory transactional node store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    snapshot: Mutex<Option<State>>,
    audit: AuditSwitch,
    actor: StdMutex<String>,
    transient_failures: AtomicU32,
    denied_deletes: StdMutex<HashSet<NodeRef>>,
    write_count: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            actor: StdMutex::new("system".to_string()),
            ..Self::default()
        }
    }

    /// Create a store and its root node; returns the existing root if the
    /// store is already present.
    pub async fn create_store(&self, store: &StoreRef) -> Result<NodeRef, StoreError> {
        let mut state = self.state.write().await;
        if let Some(root) = state.roots.get(store) {
            return Ok(root.clone());
        }
        let root = NodeRef::generate(store.clone());
        let record = NodeRecord {
            node_type: system_model::type_store_root(),
            aspects: BTreeSet::new(),
            properties: PropertyMap::new(),
            parent: None,
            children: Vec::new(),
        };
        state.nodes.insert(root.clone(), record);
        state.roots.insert(store.clone(), root.clone());
        Ok(root)
    }

    /// Actor recorded by automatic audit stamping.
    pub fn set_actor(&self, actor: impl Into<String>) {
        *self.actor.lock().expect("actor lock poisoned") = actor.into();
    }

    /// Number of mutating calls accepted so far.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Make the next `count` mutating calls fail with a transient error.
    pub fn inject_transient_failures(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Veto deletion of one node until [`MemoryStore::allow_delete`].
    pub fn deny_delete(&self, node: &NodeRef) {
        self.denied_deletes
            .lock()
            .expect("veto lock poisoned")
            .insert(node.clone());
    }

    pub fn allow_delete(&self, node: &NodeRef) {
        self.denied_deletes
            .lock()
            .expect("veto lock poisoned")
            .remove(node);
    }

    fn fail_point(&self) -> Result<(), StoreError> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .transient_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::transient("injected failure"));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.write_count.fetch_add(1, Ordering::SeqCst);
    }

    fn current_actor(&self) -> String {
        self.actor.lock().expect("actor lock poisoned").clone()
    }

    fn stamp_created(&self, record: &mut NodeRecord) {
        if !self.audit.is_enabled() {
            return;
        }
        let now = PropertyValue::Timestamp(Utc::now());
        let actor = PropertyValue::Text(self.current_actor());
        record
            .properties
            .insert(content_model::prop_created(), now.clone());
        record
            .properties
            .insert(content_model::prop_creator(), actor.clone());
        record.properties.insert(content_model::prop_modified(), now);
        record
            .properties
            .insert(content_model::prop_modifier(), actor);
    }

    fn stamp_modified(&self, record: &mut NodeRecord) {
        if !self.audit.is_enabled() {
            return;
        }
        record.properties.insert(
            content_model::prop_modified(),
            PropertyValue::Timestamp(Utc::now()),
        );
        record.properties.insert(
            content_model::prop_modifier(),
            PropertyValue::Text(self.current_actor()),
        );
    }

    async fn with_record<T>(
        &self,
        node: &NodeRef,
        f: impl FnOnce(&NodeRecord) -> T,
    ) -> Result<T, StoreError> {
        let state = self.state.read().await;
        let record = state
            .nodes
            .get(node)
            .ok_or_else(|| StoreError::NodeNotFound { node: node.clone() })?;
        Ok(f(record))
    }

    /// Ids of the primary subtree rooted at `node`, node itself included.
    fn collect_subtree(state: &State, node: &NodeRef, into: &mut Vec<NodeRef>) {
        into.push(node.clone());
        if let Some(record) = state.nodes.get(node) {
            for child in &record.children {
                if child.is_primary {
                    Self::collect_subtree(state, &child.child, into);
                }
            }
        }
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn root_node(&self, store: &StoreRef) -> Result<NodeRef, StoreError> {
        let state = self.state.read().await;
        state
            .roots
            .get(store)
            .cloned()
            .ok_or_else(|| StoreError::StoreNotFound {
                store: store.clone(),
            })
    }

    async fn exists(&self, node: &NodeRef) -> Result<bool, StoreError> {
        Ok(self.state.read().await.nodes.contains_key(node))
    }

    async fn node_type(&self, node: &NodeRef) -> Result<QName, StoreError> {
        self.with_record(node, |r| r.node_type.clone()).await
    }

    async fn create_node(
        &self,
        parent: &NodeRef,
        assoc_type: &QName,
        assoc_qname: &QName,
        node_type: &QName,
        mut properties: PropertyMap,
    ) -> Result<ChildAssoc, StoreError> {
        self.fail_point()?;
        let mut state = self.state.write().await;

        if !state.nodes.contains_key(parent) {
            return Err(StoreError::NodeNotFound {
                node: parent.clone(),
            });
        }

        // Identifier carry-over: an explicit sys:node-uuid wins over a
        // generated one.
        let id = match properties.get(&system_model::prop_node_uuid()) {
            Some(PropertyValue::Text(id)) => id.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let child_ref = NodeRef::new(parent.store().clone(), id.clone());
        if state.nodes.contains_key(&child_ref) {
            return Err(StoreError::DuplicateNodeId {
                store: parent.store().clone(),
                id,
            });
        }
        properties.insert(
            system_model::prop_node_uuid(),
            PropertyValue::Text(id.clone()),
        );
        state.next_db_id += 1;
        properties.insert(
            system_model::prop_node_dbid(),
            PropertyValue::Int(state.next_db_id),
        );

        let nth_sibling = {
            let parent_record = state.nodes.get(parent).expect("parent checked above");
            parent_record.children.len() as i32
        };
        let assoc = ChildAssoc {
            parent: parent.clone(),
            child: child_ref.clone(),
            assoc_type: assoc_type.clone(),
            qname: assoc_qname.clone(),
            is_primary: true,
            nth_sibling,
        };

        let mut record = NodeRecord {
            node_type: node_type.clone(),
            aspects: BTreeSet::new(),
            properties,
            parent: Some(assoc.clone()),
            children: Vec::new(),
        };
        self.stamp_created(&mut record);

        state.nodes.insert(child_ref, record);
        state
            .nodes
            .get_mut(parent)
            .expect("parent checked above")
            .children
            .push(assoc.clone());

        self.record_write();
        Ok(assoc)
    }

    async fn delete_node(&self, node: &NodeRef) -> Result<(), StoreError> {
        self.fail_point()?;
        if self
            .denied_deletes
            .lock()
            .expect("veto lock poisoned")
            .contains(node)
        {
            return Err(StoreError::refused(format!("delete vetoed for {node}")));
        }

        let mut state = self.state.write().await;
        if !state.nodes.contains_key(node) {
            return Err(StoreError::NodeNotFound { node: node.clone() });
        }

        let mut doomed = Vec::new();
        Self::collect_subtree(&state, node, &mut doomed);

        // Detach from the parent before removing the subtree.
        let parent = state
            .nodes
            .get(node)
            .and_then(|r| r.parent.as_ref())
            .map(|a| a.parent.clone());
        if let Some(parent_ref) = parent {
            if let Some(parent_record) = state.nodes.get_mut(&parent_ref) {
                parent_record.children.retain(|a| &a.child != node);
            }
        }

        let doomed_set: HashSet<&NodeRef> = doomed.iter().collect();
        state
            .peer_assocs
            .retain(|a| !doomed_set.contains(&a.source) && !doomed_set.contains(&a.target));
        drop(doomed_set);
        for gone in &doomed {
            state.nodes.remove(gone);
        }

        self.record_write();
        Ok(())
    }

    async fn properties(&self, node: &NodeRef) -> Result<PropertyMap, StoreError> {
        self.with_record(node, |r| r.properties.clone()).await
    }

    async fn property(
        &self,
        node: &NodeRef,
        key: &QName,
    ) -> Result<Option<PropertyValue>, StoreError> {
        self.with_record(node, |r| r.properties.get(key).cloned())
            .await
    }

    async fn set_property(
        &self,
        node: &NodeRef,
        key: &QName,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        self.fail_point()?;
        let mut state = self.state.write().await;
        let record = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| StoreError::NodeNotFound { node: node.clone() })?;
        record.properties.insert(key.clone(), value);
        self.stamp_modified(record);
        self.record_write();
        Ok(())
    }

    async fn remove_property(&self, node: &NodeRef, key: &QName) -> Result<(), StoreError> {
        self.fail_point()?;
        let mut state = self.state.write().await;
        let record = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| StoreError::NodeNotFound { node: node.clone() })?;
        if record.properties.remove(key).is_some() {
            self.stamp_modified(record);
            self.record_write();
        }
        Ok(())
    }

    async fn aspects(&self, node: &NodeRef) -> Result<BTreeSet<QName>, StoreError> {
        self.with_record(node, |r| r.aspects.clone()).await
    }

    async fn has_aspect(&self, node: &NodeRef, aspect: &QName) -> Result<bool, StoreError> {
        self.with_record(node, |r| r.aspects.contains(aspect)).await
    }

    async fn add_aspect(
        &self,
        node: &NodeRef,
        aspect: &QName,
        properties: PropertyMap,
    ) -> Result<(), StoreError> {
        self.fail_point()?;
        let mut state = self.state.write().await;
        let record = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| StoreError::NodeNotFound { node: node.clone() })?;
        record.aspects.insert(aspect.clone());
        record.properties.extend(properties);
        self.stamp_modified(record);
        self.record_write();
        Ok(())
    }

    async fn child_assocs(&self, node: &NodeRef) -> Result<Vec<ChildAssoc>, StoreError> {
        self.with_record(node, |r| r.children.clone()).await
    }

    async fn child_assocs_of_type(
        &self,
        node: &NodeRef,
        assoc_type: &QName,
    ) -> Result<Vec<ChildAssoc>, StoreError> {
        self.with_record(node, |r| {
            r.children
                .iter()
                .filter(|a| &a.assoc_type == assoc_type)
                .cloned()
                .collect()
        })
        .await
    }

    async fn child_by_name(
        &self,
        parent: &NodeRef,
        assoc_type: &QName,
        name: &str,
    ) -> Result<Option<NodeRef>, StoreError> {
        let state = self.state.read().await;
        let record = state
            .nodes
            .get(parent)
            .ok_or_else(|| StoreError::NodeNotFound {
                node: parent.clone(),
            })?;
        for assoc in &record.children {
            if &assoc.assoc_type != assoc_type {
                continue;
            }
            let child_name = state
                .nodes
                .get(&assoc.child)
                .and_then(|r| r.properties.get(&content_model::prop_name()))
                .and_then(|v| v.as_text());
            if child_name == Some(name) {
                return Ok(Some(assoc.child.clone()));
            }
        }
        Ok(None)
    }

    async fn parent_assoc(&self, node: &NodeRef) -> Result<Option<ChildAssoc>, StoreError> {
        self.with_record(node, |r| r.parent.clone()).await
    }

    async fn create_association(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        assoc_type: &QName,
    ) -> Result<PeerAssoc, StoreError> {
        self.fail_point()?;
        let mut state = self.state.write().await;
        for end in [source, target] {
            if !state.nodes.contains_key(end) {
                return Err(StoreError::NodeNotFound { node: end.clone() });
            }
        }
        let assoc = PeerAssoc {
            source: source.clone(),
            target: target.clone(),
            assoc_type: assoc_type.clone(),
        };
        state.peer_assocs.push(assoc.clone());
        let record = state.nodes.get_mut(source).expect("source checked above");
        self.stamp_modified(record);
        self.record_write();
        Ok(assoc)
    }

    async fn target_assocs(
        &self,
        node: &NodeRef,
        assoc_type: Option<&QName>,
    ) -> Result<Vec<PeerAssoc>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .peer_assocs
            .iter()
            .filter(|a| &a.source == node)
            .filter(|a| assoc_type.map_or(true, |t| &a.assoc_type == t))
            .cloned()
            .collect())
    }

    async fn source_assocs(
        &self,
        node: &NodeRef,
        assoc_type: Option<&QName>,
    ) -> Result<Vec<PeerAssoc>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .peer_assocs
            .iter()
            .filter(|a| &a.target == node)
            .filter(|a| assoc_type.map_or(true, |t| &a.assoc_type == t))
            .cloned()
            .collect())
    }

    async fn begin_transaction(&self) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot.lock().await;
        if snapshot.is_some() {
            return Err(StoreError::TransactionInProgress);
        }
        *snapshot = Some(self.state.read().await.clone());
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot.lock().await;
        if snapshot.take().is_none() {
            return Err(StoreError::NoTransaction);
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot.lock().await;
        let Some(saved) = snapshot.take() else {
            return Err(StoreError::NoTransaction);
        };
        *self.state.write().await = saved;
        Ok(())
    }

    fn audit(&self) -> &AuditSwitch {
        &self.audit
    }
}

/// In-memory content-metadata lookup.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    entries: StdMutex<HashMap<i64, ContentData>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, content_ref: i64, data: ContentData) {
        self.entries
            .lock()
            .expect("content lock poisoned")
            .insert(content_ref, data);
    }

    pub fn remove(&self, content_ref: i64) {
        self.entries
            .lock()
            .expect("content lock poisoned")
            .remove(&content_ref);
    }
}

#[async_trait]
impl ContentMetadataStore for MemoryContentStore {
    async fn lookup(&self, content_ref: i64) -> Result<Option<ContentData>, StoreError> {
        Ok(self
            .entries
            .lock()
            .expect("content lock poisoned")
            .get(&content_ref)
            .cloned())
    }
}
