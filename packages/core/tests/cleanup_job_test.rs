//! Integration Tests for the Version Store Cleanup Job
//!
//! Cleanup deletes only marker-carrying histories, retries a failing batch
//! with the failing member excluded, and is guarded by a process-scoped busy
//! flag that turns concurrent triggers into no-ops.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use verso_core::models::schema::{content_model, legacy_model, system_model, version2_model};
use verso_core::models::{
    ChildAssoc, Dictionary, NodeRef, PeerAssoc, PropertyMap, PropertyValue, QName, StoreRef,
};
use verso_core::services::{LegacyVersionService, MigrationConfig, VersionMigrator};
use verso_core::store::{
    AuditSwitch, ContentMetadataStore, MemoryContentStore, MemoryStore, NodeStore, StoreError,
};

fn live_store_ref() -> StoreRef {
    StoreRef::new("workspace", "spaces")
}

struct Fixture {
    store: Arc<MemoryStore>,
    content: Arc<MemoryContentStore>,
    dictionary: Arc<Dictionary>,
    live_root: NodeRef,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let live_root = store.create_store(&live_store_ref()).await.unwrap();
        store.create_store(&legacy_model::store_ref()).await.unwrap();
        store.create_store(&version2_model::store_ref()).await.unwrap();
        Self {
            store,
            content: Arc::new(MemoryContentStore::new()),
            dictionary: Arc::new(Dictionary::with_content_model()),
            live_root,
        }
    }

    fn migrator(&self) -> VersionMigrator {
        VersionMigrator::new(
            self.store.clone() as Arc<dyn NodeStore>,
            self.content.clone() as Arc<dyn ContentMetadataStore>,
            self.dictionary.clone(),
        )
    }

    async fn versioned_live_node(&self, name: &str) -> NodeRef {
        let mut props = PropertyMap::new();
        props.insert(content_model::prop_name(), PropertyValue::from(name));
        let live = self
            .store
            .create_node(
                &self.live_root,
                &system_model::assoc_children(),
                &QName::new("content", name),
                &QName::new("content", "document"),
                props,
            )
            .await
            .unwrap()
            .child;
        LegacyVersionService::new(self.store.clone() as Arc<dyn NodeStore>)
            .create_version(&live, BTreeMap::new())
            .await
            .unwrap();
        live
    }

    async fn legacy_history_count(&self) -> usize {
        let root = self
            .store
            .root_node(&legacy_model::store_ref())
            .await
            .unwrap();
        self.store
            .child_assocs_of_type(&root, &legacy_model::assoc_version_histories())
            .await
            .unwrap()
            .len()
    }
}

#[tokio::test]
async fn test_cleanup_deletes_only_marked_histories() {
    let fixture = Fixture::new().await;
    for name in ["a", "b", "c"] {
        fixture.versioned_live_node(name).await;
    }
    // One extra history that is never migrated.
    fixture.versioned_live_node("straggler").await;

    let migrator = fixture.migrator();
    let config = MigrationConfig {
        limit: Some(3),
        ..MigrationConfig::default()
    };
    migrator.migrate_all(&config).await.unwrap();
    assert_eq!(fixture.legacy_history_count().await, 4);

    let run = migrator.execute_cleanup(2, 1).await.unwrap().unwrap();
    assert_eq!(run.to_do, 4);
    assert_eq!(run.deleted, 3);
    assert_eq!(run.not_migrated, 1);
    assert_eq!(run.failed, 0);
    assert_eq!(fixture.legacy_history_count().await, 1);
    assert!(!migrator.is_migration_complete().await.unwrap());
}

#[tokio::test]
async fn test_cleanup_completes_migration_when_store_drains() {
    let fixture = Fixture::new().await;
    for name in ["a", "b"] {
        fixture.versioned_live_node(name).await;
    }
    let migrator = fixture.migrator();
    migrator.migrate_all(&MigrationConfig::default()).await.unwrap();

    let run = migrator.execute_cleanup(10, 1).await.unwrap().unwrap();
    assert_eq!(run.deleted, 2);
    assert_eq!(fixture.legacy_history_count().await, 0);
    assert!(migrator.is_migration_complete().await.unwrap());
}

#[tokio::test]
async fn test_failing_member_is_excluded_and_batch_retried() {
    let fixture = Fixture::new().await;
    let mut lives = Vec::new();
    for name in ["a", "b", "c"] {
        lives.push(fixture.versioned_live_node(name).await);
    }
    let migrator = fixture.migrator();
    migrator.migrate_all(&MigrationConfig::default()).await.unwrap();

    // Veto deletion of the middle history.
    let legacy = LegacyVersionService::new(fixture.store.clone() as Arc<dyn NodeStore>);
    let stuck = legacy
        .history_node_for(lives[1].id())
        .await
        .unwrap()
        .unwrap();
    fixture.store.deny_delete(&stuck);

    let run = migrator.execute_cleanup(3, 1).await.unwrap().unwrap();
    assert_eq!(run.deleted, 2);
    assert_eq!(run.failed, 1);
    assert_eq!(fixture.legacy_history_count().await, 1);
    assert!(fixture.store.exists(&stuck).await.unwrap());

    // Once the veto lifts, a re-run drains the store.
    fixture.store.allow_delete(&stuck);
    let rerun = migrator.execute_cleanup(3, 1).await.unwrap().unwrap();
    assert_eq!(rerun.deleted, 1);
    assert_eq!(fixture.legacy_history_count().await, 0);
}

#[tokio::test]
async fn test_cleanup_rejects_bad_configuration() {
    let fixture = Fixture::new().await;
    let migrator = fixture.migrator();
    assert!(migrator.execute_cleanup(0, 1).await.is_err());
    // The failed run must release the busy guard.
    assert!(migrator.execute_cleanup(1, 1).await.unwrap().is_some());
}

//
// Busy-guard test: a store wrapper that can block the first root lookup so a
// second trigger provably lands while cleanup is mid-flight.
//

struct GatedStore {
    inner: Arc<MemoryStore>,
    armed: AtomicBool,
    blocked: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            blocked: Notify::new(),
            release: Notify::new(),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn wait_until_blocked(&self) {
        self.blocked.notified().await;
    }

    fn open_gate(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl NodeStore for GatedStore {
    async fn root_node(&self, store: &StoreRef) -> Result<NodeRef, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.blocked.notify_one();
            self.release.notified().await;
        }
        self.inner.root_node(store).await
    }

    async fn exists(&self, node: &NodeRef) -> Result<bool, StoreError> {
        self.inner.exists(node).await
    }

    async fn node_type(&self, node: &NodeRef) -> Result<QName, StoreError> {
        self.inner.node_type(node).await
    }

    async fn create_node(
        &self,
        parent: &NodeRef,
        assoc_type: &QName,
        assoc_qname: &QName,
        node_type: &QName,
        properties: PropertyMap,
    ) -> Result<ChildAssoc, StoreError> {
        self.inner
            .create_node(parent, assoc_type, assoc_qname, node_type, properties)
            .await
    }

    async fn delete_node(&self, node: &NodeRef) -> Result<(), StoreError> {
        self.inner.delete_node(node).await
    }

    async fn properties(&self, node: &NodeRef) -> Result<PropertyMap, StoreError> {
        self.inner.properties(node).await
    }

    async fn property(
        &self,
        node: &NodeRef,
        key: &QName,
    ) -> Result<Option<PropertyValue>, StoreError> {
        self.inner.property(node, key).await
    }

    async fn set_property(
        &self,
        node: &NodeRef,
        key: &QName,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        self.inner.set_property(node, key, value).await
    }

    async fn remove_property(&self, node: &NodeRef, key: &QName) -> Result<(), StoreError> {
        self.inner.remove_property(node, key).await
    }

    async fn aspects(&self, node: &NodeRef) -> Result<BTreeSet<QName>, StoreError> {
        self.inner.aspects(node).await
    }

    async fn has_aspect(&self, node: &NodeRef, aspect: &QName) -> Result<bool, StoreError> {
        self.inner.has_aspect(node, aspect).await
    }

    async fn add_aspect(
        &self,
        node: &NodeRef,
        aspect: &QName,
        properties: PropertyMap,
    ) -> Result<(), StoreError> {
        self.inner.add_aspect(node, aspect, properties).await
    }

    async fn child_assocs(&self, node: &NodeRef) -> Result<Vec<ChildAssoc>, StoreError> {
        self.inner.child_assocs(node).await
    }

    async fn child_assocs_of_type(
        &self,
        node: &NodeRef,
        assoc_type: &QName,
    ) -> Result<Vec<ChildAssoc>, StoreError> {
        self.inner.child_assocs_of_type(node, assoc_type).await
    }

    async fn child_by_name(
        &self,
        parent: &NodeRef,
        assoc_type: &QName,
        name: &str,
    ) -> Result<Option<NodeRef>, StoreError> {
        self.inner.child_by_name(parent, assoc_type, name).await
    }

    async fn parent_assoc(&self, node: &NodeRef) -> Result<Option<ChildAssoc>, StoreError> {
        self.inner.parent_assoc(node).await
    }

    async fn create_association(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        assoc_type: &QName,
    ) -> Result<PeerAssoc, StoreError> {
        self.inner.create_association(source, target, assoc_type).await
    }

    async fn target_assocs(
        &self,
        node: &NodeRef,
        assoc_type: Option<&QName>,
    ) -> Result<Vec<PeerAssoc>, StoreError> {
        self.inner.target_assocs(node, assoc_type).await
    }

    async fn source_assocs(
        &self,
        node: &NodeRef,
        assoc_type: Option<&QName>,
    ) -> Result<Vec<PeerAssoc>, StoreError> {
        self.inner.source_assocs(node, assoc_type).await
    }

    async fn begin_transaction(&self) -> Result<(), StoreError> {
        self.inner.begin_transaction().await
    }

    async fn commit_transaction(&self) -> Result<(), StoreError> {
        self.inner.commit_transaction().await
    }

    async fn rollback_transaction(&self) -> Result<(), StoreError> {
        self.inner.rollback_transaction().await
    }

    fn audit(&self) -> &AuditSwitch {
        self.inner.audit()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_cleanup_triggers_are_no_ops() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("doc").await;
    let migrator = fixture.migrator();
    migrator.migrate_all(&MigrationConfig::default()).await.unwrap();

    let gated = Arc::new(GatedStore::new(fixture.store.clone()));
    let guarded_migrator = Arc::new(VersionMigrator::new(
        gated.clone() as Arc<dyn NodeStore>,
        fixture.content.clone() as Arc<dyn ContentMetadataStore>,
        fixture.dictionary.clone(),
    ));

    gated.arm();
    let first = {
        let migrator = guarded_migrator.clone();
        tokio::spawn(async move { migrator.execute_cleanup(1, 1).await })
    };
    gated.wait_until_blocked().await;

    // The second trigger lands while the first run is active: a no-op.
    let second = guarded_migrator.execute_cleanup(1, 1).await.unwrap();
    assert!(second.is_none());

    gated.open_gate();
    let first = first.await.unwrap().unwrap();
    let first = first.expect("first trigger should have run");
    assert_eq!(first.deleted, 1);
}
