//! Integration Tests for the Migration Job Surface
//!
//! The operator entry point: migration followed by standalone cleanup,
//! suppression flags, legacy-only mode and multi-tenant iteration.

use std::collections::BTreeMap;
use std::sync::Arc;
use verso_core::models::schema::{content_model, legacy_model, system_model, version2_model};
use verso_core::models::{
    Dictionary, NodeRef, PropertyMap, PropertyValue, QName, SchemaDescriptor, StoreRef,
};
use verso_core::services::{LegacyVersionService, MigrationJob, MigrationJobConfig};
use verso_core::store::{ContentMetadataStore, MemoryContentStore, MemoryStore, NodeStore};

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

    fn job(&self, config: MigrationJobConfig) -> MigrationJob {
        MigrationJob::new(
            self.store.clone() as Arc<dyn NodeStore>,
            self.content.clone() as Arc<dyn ContentMetadataStore>,
            self.dictionary.clone(),
            config,
        )
    }

    async fn create_live_node(&self, name: &str) -> NodeRef {
        let mut props = PropertyMap::new();
        props.insert(content_model::prop_name(), PropertyValue::from(name));
        self.store
            .create_node(
                &self.live_root,
                &system_model::assoc_children(),
                &QName::new("content", name),
                &QName::new("content", "document"),
                props,
            )
            .await
            .unwrap()
            .child
    }

    async fn versioned_live_node(&self, name: &str) -> NodeRef {
        let live = self.create_live_node(name).await;
        LegacyVersionService::new(self.store.clone() as Arc<dyn NodeStore>)
            .create_version(&live, BTreeMap::new())
            .await
            .unwrap();
        live
    }

    async fn history_count(&self, store_ref: &StoreRef, assoc: &QName) -> usize {
        let root = self.store.root_node(store_ref).await.unwrap();
        self.store
            .child_assocs_of_type(&root, assoc)
            .await
            .unwrap()
            .len()
    }

    async fn legacy_history_count(&self) -> usize {
        self.history_count(
            &legacy_model::store_ref(),
            &legacy_model::assoc_version_histories(),
        )
        .await
    }

    async fn current_history_count(&self) -> usize {
        self.history_count(
            &version2_model::store_ref(),
            &version2_model::assoc_version_histories(),
        )
        .await
    }
}

#[tokio::test]
async fn test_job_migrates_then_cleans_up() {
    let fixture = Fixture::new().await;
    for name in ["a", "b"] {
        fixture.versioned_live_node(name).await;
    }

    let runs = fixture
        .job(MigrationJobConfig::default())
        .run()
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, "");
    assert_eq!(runs[0].1.migrated, 2);
    assert!(runs[0].1.complete);

    // Marked histories were cleaned up by the trailing standalone pass.
    assert_eq!(fixture.legacy_history_count().await, 0);
    assert_eq!(fixture.current_history_count().await, 2);
}

#[tokio::test]
async fn test_running_as_part_of_another_job_suppresses_cleanup() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("doc").await;

    let config = MigrationJobConfig {
        run_as_part_of_job: true,
        ..MigrationJobConfig::default()
    };
    let runs = fixture.job(config).run().await.unwrap();
    assert_eq!(runs[0].1.migrated, 1);

    // The marked legacy history survives for the owning job's cleanup.
    assert_eq!(fixture.legacy_history_count().await, 1);
    assert_eq!(fixture.current_history_count().await, 1);
}

#[tokio::test]
async fn test_legacy_only_mode_is_a_no_op() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("doc").await;

    let config = MigrationJobConfig {
        use_legacy_only: true,
        ..MigrationJobConfig::default()
    };
    let runs = fixture.job(config).run().await.unwrap();
    assert!(runs.is_empty());
    assert_eq!(fixture.legacy_history_count().await, 1);
    assert_eq!(fixture.current_history_count().await, 0);
}

#[tokio::test]
async fn test_delete_immediately_needs_no_cleanup_pass() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("doc").await;

    let config = MigrationJobConfig {
        delete_immediately: true,
        ..MigrationJobConfig::default()
    };
    let runs = fixture.job(config).run().await.unwrap();
    assert_eq!(runs[0].1.migrated, 1);
    assert_eq!(fixture.legacy_history_count().await, 0);
    assert_eq!(fixture.current_history_count().await, 1);
}

#[tokio::test]
async fn test_bad_configuration_aborts_the_job() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("doc").await;

    let config = MigrationJobConfig {
        batch_size: 0,
        ..MigrationJobConfig::default()
    };
    assert!(fixture.job(config).run().await.is_err());
    assert_eq!(fixture.legacy_history_count().await, 1);
}

#[tokio::test]
async fn test_multi_tenant_iteration() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("default-doc").await;

    // Tenant-scoped store pair with its own history.
    let tenant_legacy = SchemaDescriptor::legacy().for_tenant("acme");
    let tenant_current = SchemaDescriptor::version2().for_tenant("acme");
    fixture.store.create_store(&tenant_legacy.store).await.unwrap();
    fixture.store.create_store(&tenant_current.store).await.unwrap();
    let tenant_live = fixture.create_live_node("acme-doc").await;
    LegacyVersionService::with_schema(
        fixture.store.clone() as Arc<dyn NodeStore>,
        tenant_legacy.clone(),
    )
    .create_version(&tenant_live, BTreeMap::new())
    .await
    .unwrap();

    let config = MigrationJobConfig {
        migrate_all_tenants: true,
        tenants: vec!["acme".to_string()],
        ..MigrationJobConfig::default()
    };
    let runs = fixture.job(config).run().await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].0, "");
    assert_eq!(runs[1].0, "acme");
    assert_eq!(runs[1].1.migrated, 1);

    assert_eq!(fixture.legacy_history_count().await, 0);
    assert_eq!(
        fixture
            .history_count(&tenant_legacy.store, &tenant_legacy.assoc_version_histories)
            .await,
        0
    );
    assert_eq!(
        fixture
            .history_count(
                &tenant_current.store,
                &tenant_current.assoc_version_histories
            )
            .await,
        1
    );
}
