//! Integration Tests for the Version Store Migration Engine
//!
//! Covers the end-to-end rewrite of legacy histories into the current
//! schema: identifier continuity, order preservation, auditable-field
//! fidelity, idempotent re-runs, partial-failure isolation and the
//! immediate-delete path.

use std::collections::BTreeMap;
use std::sync::Arc;
use verso_core::models::schema::{content_model, legacy_model, system_model, version2_model};
use verso_core::models::{
    ContentData, Dictionary, NodeRef, PropertyMap, PropertyValue, QName, StoreRef,
};
use verso_core::services::{
    LegacyVersionService, MigrationConfig, VersionMigrator, VersionService,
};
use verso_core::store::{ContentMetadataStore, MemoryContentStore, MemoryStore, NodeStore};

fn live_store_ref() -> StoreRef {
    StoreRef::new("workspace", "spaces")
}

fn doc_type() -> QName {
    QName::new("content", "document")
}

fn prop(local: &str) -> QName {
    QName::new("content", local)
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

    fn legacy(&self) -> LegacyVersionService {
        LegacyVersionService::new(self.store.clone() as Arc<dyn NodeStore>)
    }

    fn version_service(&self) -> VersionService {
        VersionService::new(
            self.store.clone() as Arc<dyn NodeStore>,
            self.dictionary.clone(),
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
                &doc_type(),
                props,
            )
            .await
            .unwrap()
            .child
    }

    /// A live node with `count` legacy versions, each differing in one
    /// property.
    async fn versioned_live_node(&self, name: &str, count: usize) -> NodeRef {
        let live = self.create_live_node(name).await;
        let legacy = self.legacy();
        for revision in 0..count {
            self.store
                .set_property(
                    &live,
                    &prop("revision"),
                    PropertyValue::Int(revision as i64),
                )
                .await
                .unwrap();
            legacy.create_version(&live, BTreeMap::new()).await.unwrap();
        }
        live
    }

    async fn legacy_history_of(&self, live: &NodeRef) -> NodeRef {
        self.legacy()
            .history_node_for(live.id())
            .await
            .unwrap()
            .expect("legacy history should exist")
    }
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let fixture = Fixture::new().await;
    let live = fixture.create_live_node("report").await;
    let store = &fixture.store;

    // Two scalar properties, one multi-valued property, one resolvable
    // content property.
    store
        .set_property(&live, &prop("title"), PropertyValue::from("Quarterly"))
        .await
        .unwrap();
    store
        .set_property(&live, &prop("pageCount"), PropertyValue::Int(12))
        .await
        .unwrap();
    store
        .set_property(
            &live,
            &prop("keywords"),
            PropertyValue::Multi(vec!["finance".into(), "q3".into()]),
        )
        .await
        .unwrap();
    fixture.content.insert(
        7,
        ContentData {
            mime_type: "text/plain".to_string(),
            encoding: "UTF-8".to_string(),
            size: 64,
            url: "store://7".to_string(),
        },
    );
    store
        .set_property(&live, &prop("body"), PropertyValue::ContentRef(7))
        .await
        .unwrap();

    // One child that survives and one that is deleted after versioning.
    let keeper_child = store
        .create_node(
            &live,
            &system_model::assoc_children(),
            &QName::new("content", "keeper"),
            &doc_type(),
            PropertyMap::new(),
        )
        .await
        .unwrap()
        .child;
    let doomed_child = store
        .create_node(
            &live,
            &system_model::assoc_children(),
            &QName::new("content", "doomed"),
            &doc_type(),
            PropertyMap::new(),
        )
        .await
        .unwrap()
        .child;

    // Three legacy versions.
    let legacy = fixture.legacy();
    for revision in 0..3 {
        store
            .set_property(&live, &prop("revision"), PropertyValue::Int(revision))
            .await
            .unwrap();
        legacy.create_version(&live, BTreeMap::new()).await.unwrap();
    }

    // The second child disappears after versioning.
    store.delete_node(&doomed_child).await.unwrap();

    // Capture the expected frozen state through the facade before migrating.
    let migrator = fixture.migrator();
    let history_node = fixture.legacy_history_of(&live).await;
    let legacy_history = legacy.build_version_history(&history_node, &live).await.unwrap();
    assert_eq!(legacy_history.len(), 3);
    let facade = migrator.version_node_service();
    let mut expected = Vec::new();
    for version in legacy_history.all_versions() {
        let mut props = facade.properties(version.frozen_node()).await.unwrap();
        props.remove(&system_model::prop_node_uuid());
        expected.push((version.label().to_string(), props));
    }

    let run = migrator.migrate_all(&MigrationConfig::default()).await.unwrap();
    assert_eq!(run.migrated, 1);
    assert_eq!(run.failed, 0);
    assert!(run.complete);

    // Same three versions, same order, same labels.
    let current = fixture.version_service();
    let migrated = current.version_history(&live).await.unwrap().unwrap();
    assert_eq!(migrated.len(), 3);
    let labels: Vec<&str> = migrated.all_versions().iter().map(|v| v.label()).collect();
    assert_eq!(labels, vec!["1.0", "1.1", "1.2"]);

    for (version, (expected_label, expected_props)) in
        migrated.all_versions().iter().zip(&expected)
    {
        assert_eq!(version.label(), expected_label.as_str());
        let mut props = facade.properties(version.frozen_node()).await.unwrap();
        props.remove(&system_model::prop_node_uuid());
        assert_eq!(&props, expected_props);

        // Exactly the still-existing child association survives.
        let children = facade.child_assocs(version.frozen_node()).await.unwrap();
        let targets: Vec<&str> = children.iter().map(|a| a.child.id()).collect();
        assert_eq!(targets, vec![keeper_child.id()]);
    }
}

#[tokio::test]
async fn test_identifier_continuity() {
    let fixture = Fixture::new().await;
    let live = fixture.versioned_live_node("doc", 3).await;

    let legacy = fixture.legacy();
    let history_node = fixture.legacy_history_of(&live).await;
    let before = legacy.build_version_history(&history_node, &live).await.unwrap();

    let migrator = fixture.migrator();
    migrator.migrate_all(&MigrationConfig::default()).await.unwrap();

    let after = fixture
        .version_service()
        .version_history(&live)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.len(), after.len());
    for (old, new) in before.all_versions().iter().zip(after.all_versions()) {
        // The frozen-node identifier crosses the migration unchanged.
        assert_eq!(old.frozen_node().id(), new.frozen_node().id());
        assert_ne!(old.frozen_node().store(), new.frozen_node().store());
    }
}

#[tokio::test]
async fn test_auditable_field_fidelity() {
    let fixture = Fixture::new().await;
    fixture.store.set_actor("alice");
    let live = fixture.versioned_live_node("doc", 2).await;

    let history_node = fixture.legacy_history_of(&live).await;
    let legacy_versions = fixture
        .legacy()
        .build_version_history(&history_node, &live)
        .await
        .unwrap();
    let mut originals = Vec::new();
    for version in legacy_versions.all_versions() {
        let created = fixture
            .store
            .property(version.frozen_node(), &content_model::prop_created())
            .await
            .unwrap()
            .unwrap();
        let creator = fixture
            .store
            .property(version.frozen_node(), &content_model::prop_creator())
            .await
            .unwrap()
            .unwrap();
        originals.push((version.label().to_string(), created, creator));
    }

    // The migration itself runs as somebody else, later.
    fixture.store.set_actor("admin");
    let migrator = fixture.migrator();
    migrator.migrate_all(&MigrationConfig::default()).await.unwrap();

    let migrated = fixture
        .version_service()
        .version_history(&live)
        .await
        .unwrap()
        .unwrap();
    for (version, (label, created, creator)) in
        migrated.all_versions().iter().zip(&originals)
    {
        assert_eq!(version.label(), label.as_str());
        let new_created = fixture
            .store
            .property(version.frozen_node(), &content_model::prop_created())
            .await
            .unwrap()
            .unwrap();
        let new_creator = fixture
            .store
            .property(version.frozen_node(), &content_model::prop_creator())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&new_created, created);
        assert_eq!(&new_creator, creator);
        assert_eq!(new_creator.as_text(), Some("alice"));
    }
}

#[tokio::test]
async fn test_idempotent_rerun_performs_zero_writes() {
    let fixture = Fixture::new().await;
    for name in ["a", "b", "c"] {
        fixture.versioned_live_node(name, 2).await;
    }

    let migrator = fixture.migrator();
    let first = migrator.migrate_all(&MigrationConfig::default()).await.unwrap();
    assert_eq!(first.migrated, 3);
    assert_eq!(first.already_migrated, 0);

    let writes_after_first = fixture.store.write_count();
    let second = migrator.migrate_all(&MigrationConfig::default()).await.unwrap();
    assert_eq!(second.migrated, 0);
    assert_eq!(second.already_migrated, 3);
    assert!(second.complete);
    assert_eq!(fixture.store.write_count(), writes_after_first);
}

#[tokio::test]
async fn test_partial_failure_abandons_whole_batch() {
    let fixture = Fixture::new().await;
    let mut lives = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        lives.push(fixture.versioned_live_node(name, 2).await);
    }

    // Corrupt the middle history with a branch: one version gains a second
    // successor link.
    let corrupted_history = fixture.legacy_history_of(&lives[2]).await;
    let versions = fixture
        .store
        .child_assocs_of_type(&corrupted_history, &legacy_model::assoc_versions())
        .await
        .unwrap();
    let first_version = &versions[0].child;
    let mut rogue_props = PropertyMap::new();
    rogue_props.insert(
        legacy_model::prop_version_label(),
        PropertyValue::from("9.9"),
    );
    let rogue = fixture
        .store
        .create_node(
            &corrupted_history,
            &legacy_model::assoc_versions(),
            &QName::new("version", "version-9.9"),
            &legacy_model::type_version(),
            rogue_props,
        )
        .await
        .unwrap()
        .child;
    fixture
        .store
        .create_association(first_version, &rogue, &legacy_model::assoc_successor())
        .await
        .unwrap();

    let migrator = fixture.migrator();
    let config = MigrationConfig {
        batch_size: 5,
        ..MigrationConfig::default()
    };
    let run = migrator.migrate_all(&config).await.unwrap();

    // The whole batch is reported failed and nothing is marked.
    assert_eq!(run.failed, 5);
    assert_eq!(run.migrated, 0);
    assert_eq!(run.failed_batches, 1);
    assert!(!run.complete);
    for live in &lives {
        let history = fixture.legacy_history_of(live).await;
        assert!(!migrator.is_migrated(&history).await.unwrap());
    }
    // No partial state leaked into the new store.
    let current_root = fixture
        .store
        .root_node(&version2_model::store_ref())
        .await
        .unwrap();
    assert!(fixture
        .store
        .child_assocs(&current_root)
        .await
        .unwrap()
        .is_empty());

    // A re-run retries all five and fails the same way.
    let rerun = migrator.migrate_all(&config).await.unwrap();
    assert_eq!(rerun.failed, 5);
}

#[tokio::test]
async fn test_single_history_batches_isolate_the_corrupt_one() {
    let fixture = Fixture::new().await;
    let mut lives = Vec::new();
    for name in ["a", "b", "c"] {
        lives.push(fixture.versioned_live_node(name, 1).await);
    }
    // Branch the last history.
    let corrupted_history = fixture.legacy_history_of(&lives[2]).await;
    let versions = fixture
        .store
        .child_assocs_of_type(&corrupted_history, &legacy_model::assoc_versions())
        .await
        .unwrap();
    let mut rogue_props = PropertyMap::new();
    rogue_props.insert(
        legacy_model::prop_version_label(),
        PropertyValue::from("9.9"),
    );
    let rogue = fixture
        .store
        .create_node(
            &corrupted_history,
            &legacy_model::assoc_versions(),
            &QName::new("version", "version-9.9"),
            &legacy_model::type_version(),
            rogue_props,
        )
        .await
        .unwrap()
        .child;
    fixture
        .store
        .create_association(&versions[0].child, &rogue, &legacy_model::assoc_successor())
        .await
        .unwrap();

    let migrator = fixture.migrator();
    let run = migrator.migrate_all(&MigrationConfig::default()).await.unwrap();
    assert_eq!(run.migrated, 2);
    assert_eq!(run.failed, 1);
    assert_eq!(run.failed_batches, 1);
}

#[tokio::test]
async fn test_transient_fault_is_retried_within_the_batch() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("doc", 2).await;

    let migrator = fixture.migrator();
    fixture.store.inject_transient_failures(1);
    let run = migrator.migrate_all(&MigrationConfig::default()).await.unwrap();
    assert_eq!(run.migrated, 1);
    assert_eq!(run.failed, 0);
    assert!(run.complete);
}

#[tokio::test]
async fn test_delete_immediately_skips_the_marker_state() {
    let fixture = Fixture::new().await;
    let live = fixture.versioned_live_node("doc", 2).await;

    let migrator = fixture.migrator();
    let config = MigrationConfig {
        delete_immediately: true,
        ..MigrationConfig::default()
    };
    let run = migrator.migrate_all(&config).await.unwrap();
    assert_eq!(run.migrated, 1);
    assert!(run.complete);

    // Legacy history gone, new history present.
    assert!(fixture
        .legacy()
        .history_node_for(live.id())
        .await
        .unwrap()
        .is_none());
    assert!(fixture
        .version_service()
        .is_versioned(&live)
        .await
        .unwrap());
    assert!(migrator.is_migration_complete().await.unwrap());
}

#[tokio::test]
async fn test_versioned_working_copy_is_skipped_but_marked() {
    let fixture = Fixture::new().await;
    let live = fixture.create_live_node("wc").await;
    fixture
        .store
        .add_aspect(&live, &content_model::aspect_working_copy(), PropertyMap::new())
        .await
        .unwrap();
    fixture
        .store
        .add_aspect(&live, &content_model::aspect_versionable(), PropertyMap::new())
        .await
        .unwrap();
    fixture
        .legacy()
        .create_version(&live, BTreeMap::new())
        .await
        .unwrap();

    let migrator = fixture.migrator();
    let run = migrator.migrate_all(&MigrationConfig::default()).await.unwrap();
    assert_eq!(run.failed, 0);

    // Not migrated into the new store, but its terminal state still applies.
    assert!(!fixture
        .version_service()
        .is_versioned(&live)
        .await
        .unwrap());
    let history = fixture.legacy_history_of(&live).await;
    assert!(migrator.is_migrated(&history).await.unwrap());
}

#[tokio::test]
async fn test_limit_caps_one_cycle_and_reports_in_progress() {
    let fixture = Fixture::new().await;
    for name in ["a", "b", "c"] {
        fixture.versioned_live_node(name, 1).await;
    }

    let migrator = fixture.migrator();
    let config = MigrationConfig {
        limit: Some(2),
        ..MigrationConfig::default()
    };
    let first = migrator.migrate_all(&config).await.unwrap();
    assert_eq!(first.migrated, 2);
    assert!(!first.complete);

    let second = migrator.migrate_all(&config).await.unwrap();
    assert_eq!(second.migrated, 1);
    assert_eq!(second.already_migrated, 2);
    assert!(second.complete);
}

#[tokio::test]
async fn test_invalid_configuration_aborts_before_work() {
    let fixture = Fixture::new().await;
    fixture.versioned_live_node("doc", 1).await;

    let migrator = fixture.migrator();
    let config = MigrationConfig {
        batch_size: 0,
        ..MigrationConfig::default()
    };
    let writes_before = fixture.store.write_count();
    assert!(migrator.migrate_all(&config).await.is_err());
    assert_eq!(fixture.store.write_count(), writes_before);
}
