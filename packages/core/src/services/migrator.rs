//! Version Store Migrator
//!
//! Rewrites legacy version histories into the current schema and cleans up
//! the confirmed-migrated leftovers, in fixed-size transactional batches that
//! stay restartable at every point:
//!
//! - Histories are enumerated once as a stable snapshot, then processed in
//!   batches of `batch_size`, each inside one store transaction retried a
//!   bounded number of times on transient faults. A batch that still fails is
//!   abandoned whole and counted; the next run picks its histories up again.
//! - A migrated history is either deleted immediately or marked by the
//!   reversible name-prefix convention; the marker is the only persistent
//!   done-bit, which is what makes re-runs idempotent.
//! - Within one history versions are recreated strictly oldest-first so the
//!   forward successor links are well-formed at each step. Across histories
//!   no ordering is needed.
//! - Cleanup deletes only marked histories, retries a failing batch with the
//!   failing member excluded until the batch drains, and runs behind a
//!   compare-and-swap busy flag: concurrent triggers are no-ops.

use crate::models::schema::content_model;
use crate::models::{Dictionary, NodeRef, PropertyValue, SchemaDescriptor, Version};
use crate::services::error::VersionServiceError;
use crate::services::legacy_version_service::LegacyVersionService;
use crate::services::pending::PendingNodeState;
use crate::services::progress::BatchProgress;
use crate::services::version_node_service::VersionNodeService;
use crate::services::version_service::VersionService;
use crate::store::{ContentMetadataStore, NodeStore};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Name prefix marking a legacy history as migrated.
pub const MIGRATED_NAME_PREFIX: &str = "migrated-";

/// Batch runner configuration. Validation is fatal: a bad value aborts the
/// run before any work starts.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Histories per transactional batch.
    pub batch_size: usize,
    /// Parallelism hint; accepted and validated, execution is sequential.
    pub thread_count: usize,
    /// Cap on histories migrated in this run; `None` is unbounded.
    pub limit: Option<usize>,
    /// Delete each legacy history in the same transaction that migrates it,
    /// skipping the marker state.
    pub delete_immediately: bool,
    /// Transaction retries per batch on transient store faults.
    pub max_retries: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            thread_count: 1,
            limit: None,
            delete_immediately: false,
            max_retries: 1,
        }
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<(), VersionServiceError> {
        if self.batch_size < 1 {
            return Err(VersionServiceError::InvalidConfiguration(format!(
                "batch size must be at least 1, got {}",
                self.batch_size
            )));
        }
        if self.thread_count < 1 {
            return Err(VersionServiceError::InvalidConfiguration(format!(
                "thread count must be at least 1, got {}",
                self.thread_count
            )));
        }
        Ok(())
    }
}

/// Outcome of one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRun {
    /// Legacy histories found in the snapshot.
    pub to_do: usize,
    pub migrated: usize,
    pub already_migrated: usize,
    /// Histories in abandoned batches.
    pub failed: usize,
    pub batch_count: usize,
    pub failed_batches: usize,
    pub complete: bool,
    pub elapsed: Duration,
}

/// Outcome of one cleanup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupRun {
    pub to_do: usize,
    pub deleted: usize,
    /// Histories without the migration marker, skipped.
    pub not_migrated: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

pub struct VersionMigrator {
    store: Arc<dyn NodeStore>,
    legacy: LegacyVersionService,
    current: VersionService,
    version_nodes: VersionNodeService,
    cleanup_busy: AtomicBool,
    migration_complete: Mutex<Option<bool>>,
}

impl VersionMigrator {
    pub fn new(
        store: Arc<dyn NodeStore>,
        content: Arc<dyn ContentMetadataStore>,
        dictionary: Arc<Dictionary>,
    ) -> Self {
        Self::with_schemas(
            store,
            content,
            dictionary,
            SchemaDescriptor::legacy(),
            SchemaDescriptor::version2(),
        )
    }

    /// Migrator over explicit (e.g. tenant-scoped) schema descriptors.
    pub fn with_schemas(
        store: Arc<dyn NodeStore>,
        content: Arc<dyn ContentMetadataStore>,
        dictionary: Arc<Dictionary>,
        legacy: SchemaDescriptor,
        current: SchemaDescriptor,
    ) -> Self {
        Self {
            store: store.clone(),
            legacy: LegacyVersionService::with_schema(store.clone(), legacy.clone()),
            current: VersionService::with_schema(store.clone(), dictionary, current.clone()),
            version_nodes: VersionNodeService::new(store, content, legacy, current),
            cleanup_busy: AtomicBool::new(false),
            migration_complete: Mutex::new(None),
        }
    }

    pub fn legacy_service(&self) -> &LegacyVersionService {
        &self.legacy
    }

    pub fn version_service(&self) -> &VersionService {
        &self.current
    }

    pub fn version_node_service(&self) -> &VersionNodeService {
        &self.version_nodes
    }

    //
    // MARKER
    //

    /// Mark a legacy history migrated by the name-prefix convention.
    pub async fn mark_migrated(&self, history_node: &NodeRef) -> Result<(), VersionServiceError> {
        let marked = format!("{}{}", MIGRATED_NAME_PREFIX, history_node.id());
        self.store
            .set_property(
                history_node,
                &content_model::prop_name(),
                PropertyValue::from(marked),
            )
            .await?;
        Ok(())
    }

    pub async fn is_migrated(&self, history_node: &NodeRef) -> Result<bool, VersionServiceError> {
        let name = self
            .store
            .property(history_node, &content_model::prop_name())
            .await?;
        Ok(name
            .as_ref()
            .and_then(|v| v.as_text())
            .map(|n| n.starts_with(MIGRATED_NAME_PREFIX))
            .unwrap_or(false))
    }

    /// Whether migration of the legacy store has completed. Computed lazily
    /// as the legacy store holding no histories; migration and cleanup runs
    /// update the cached answer as they learn better.
    pub async fn is_migration_complete(&self) -> Result<bool, VersionServiceError> {
        if let Some(complete) = *self.migration_complete.lock().expect("cache poisoned") {
            return Ok(complete);
        }
        let complete = self.legacy_histories().await?.is_empty();
        *self.migration_complete.lock().expect("cache poisoned") = Some(complete);
        Ok(complete)
    }

    fn set_migration_complete(&self, value: Option<bool>) {
        *self.migration_complete.lock().expect("cache poisoned") = value;
    }

    //
    // PER-HISTORY MIGRATION
    //

    /// Rebuild one legacy history in the current schema, preserving order,
    /// content, identity and auditable fields.
    pub async fn migrate_version_history(
        &self,
        legacy_history: &NodeRef,
        versioned_node: &NodeRef,
    ) -> Result<NodeRef, VersionServiceError> {
        let history = self
            .legacy
            .build_version_history(legacy_history, versioned_node)
            .await?;
        let new_history = self.current.create_version_history(versioned_node).await?;

        // Migrated versions keep their original auditable fields; suspend
        // automatic stamping until the whole chain is rebuilt.
        let _pause = self.store.audit().pause();
        for version in history.all_versions() {
            self.recreate_version(&new_history, version).await?;
        }
        Ok(new_history)
    }

    /// Recreate one frozen version in the current schema.
    async fn recreate_version(
        &self,
        new_history: &NodeRef,
        version: &Version,
    ) -> Result<NodeRef, VersionServiceError> {
        let frozen_node = version.frozen_node();

        // Frozen state through the dual-schema facade (legacy encoding).
        let node_type = self.version_nodes.node_type(frozen_node).await?;
        let aspects = self.version_nodes.aspects(frozen_node).await?;
        let mut properties = self.version_nodes.properties(frozen_node).await?;
        let child_assocs = self.version_nodes.child_assocs(frozen_node).await?;
        let peer_assocs = self.version_nodes.peer_assocs(frozen_node).await?;

        // Identifier continuity: the new frozen node keeps the legacy frozen
        // node's identifier.
        properties.insert(
            crate::models::schema::system_model::prop_node_uuid(),
            PropertyValue::from(frozen_node.id()),
        );
        let frozen_db_id = properties
            .get(&crate::models::schema::system_model::prop_node_dbid())
            .and_then(|v| v.as_int())
            .unwrap_or_default();

        // The version node's own auditable fields come from the legacy
        // version node itself, not from the frozen live state, so migrated
        // versions retain their original authorship and timing.
        let mut audit_values = Vec::new();
        for key in content_model::auditable_properties() {
            if let Some(value) = self.store.property(frozen_node, &key).await? {
                audit_values.push((key, value));
            }
        }

        let mut pending = PendingNodeState::new(node_type.clone());
        for (key, value) in &properties {
            pending.add_property(&node_type, key.clone(), value.clone());
        }
        for aspect in aspects {
            pending.add_aspect(aspect);
        }
        for assoc in child_assocs {
            pending.add_child_assoc(assoc);
        }
        for assoc in peer_assocs {
            pending.add_peer_assoc(assoc);
        }

        let standard = self.current.standard_version_properties(
            version.versioned_node(),
            frozen_db_id,
            version.label(),
            version.description(),
        );
        let new_version = self
            .current
            .create_frozen_version(new_history, &pending, standard, version.metadata())
            .await?;

        // Overwrite the new version node's auditable fields with the
        // captured ones. The caller holds the audit pause, so these writes
        // are not re-stamped.
        for (key, value) in audit_values {
            self.store.set_property(&new_version, &key, value).await?;
        }

        tracing::trace!(
            "migrated version '{}' of {} -> {new_version}",
            version.label(),
            version.versioned_node()
        );
        Ok(new_version)
    }

    /// Migrate one history and apply its terminal state (marker or
    /// immediate deletion).
    async fn migrate_one(
        &self,
        history_node: &NodeRef,
        delete_immediately: bool,
    ) -> Result<(), VersionServiceError> {
        if self.legacy.is_versioned_working_copy(history_node).await? {
            tracing::warn!("found a versioned working copy history {history_node}, skipping");
        } else {
            match self.legacy.versioned_node_of(history_node).await? {
                Some(versioned_node) => {
                    self.migrate_version_history(history_node, &versioned_node)
                        .await?;
                }
                None => {
                    tracing::warn!("legacy history {history_node} holds no versions, skipping");
                }
            }
        }

        if delete_immediately {
            self.legacy.delete_version_history(history_node).await?;
        } else {
            self.mark_migrated(history_node).await?;
        }
        Ok(())
    }

    //
    // BATCH RUNNER (migration mode)
    //

    /// Migrate the whole legacy population in transactional batches.
    pub async fn migrate_all(
        &self,
        config: &MigrationConfig,
    ) -> Result<MigrationRun, VersionServiceError> {
        config.validate()?;
        let started = Instant::now();

        let histories = self.legacy_histories().await?;
        let to_do = histories.len();
        if to_do == 0 {
            tracing::debug!("no legacy version histories found, nothing to migrate");
            self.set_migration_complete(Some(true));
            return Ok(MigrationRun {
                to_do: 0,
                migrated: 0,
                already_migrated: 0,
                failed: 0,
                batch_count: 0,
                failed_batches: 0,
                complete: true,
                elapsed: started.elapsed(),
            });
        }
        self.set_migration_complete(Some(false));
        tracing::info!(
            "found {to_do} version histories in legacy version store (in {:?})",
            started.elapsed()
        );
        tracing::debug!(
            "batch_size={}, thread_count={}, delete_immediately={}",
            config.batch_size,
            config.thread_count,
            config.delete_immediately
        );

        // First run: the new store is empty, so the marker check can be
        // skipped wholesale.
        let current_root = self.current.root_node().await?;
        let first_run = self
            .store
            .child_assocs_of_type(&current_root, &self.current.schema().assoc_version_histories)
            .await?
            .is_empty();
        if !first_run {
            tracing::warn!("this is not the first migration attempt");
        }

        let mut already_migrated = 0usize;
        let mut work = Vec::new();
        for assoc in &histories {
            if !first_run && self.is_migrated(&assoc.child).await? {
                already_migrated += 1;
                continue;
            }
            work.push(assoc.child.clone());
            if let Some(limit) = config.limit {
                if work.len() >= limit {
                    tracing::info!("limiting this job cycle to {limit} version histories");
                    break;
                }
            }
        }

        let batches: Vec<Vec<NodeRef>> = work
            .chunks(config.batch_size)
            .map(|c| c.to_vec())
            .collect();
        let batch_count = batches.len();
        let mut progress = BatchProgress::new("version store migration", work.len());
        let mut migrated = 0usize;
        let mut failed = 0usize;
        let mut failed_batches = 0usize;

        for batch in batches {
            let batch_started = Instant::now();
            match self.run_migration_batch(&batch, config).await {
                Ok(()) => {
                    migrated += batch.len();
                    tracing::trace!(
                        "migrated batch of {} version histories in {:?}",
                        batch.len(),
                        batch_started.elapsed()
                    );
                }
                Err(err) => {
                    failed += batch.len();
                    failed_batches += 1;
                    tracing::warn!(
                        "abandoning batch of {} version histories after error: {err}",
                        batch.len()
                    );
                }
            }
            for _ in 0..batch.len() {
                progress.item_processed();
            }
        }

        if already_migrated > 0 {
            tracing::warn!("skipped {already_migrated} already-migrated version histories");
        }
        let complete = failed == 0
            && (config.limit.is_none() || migrated + already_migrated == to_do);
        if failed > 0 {
            tracing::warn!(
                "version store migration incomplete: {failed} of {to_do} histories failed \
                 across {failed_batches} batches (in {:?})",
                started.elapsed()
            );
        } else if complete {
            tracing::info!(
                "version store migration complete: migrated {migrated} of {to_do} histories \
                 (in {:?}, delete_immediately={})",
                started.elapsed(),
                config.delete_immediately
            );
        } else {
            tracing::info!(
                "version store migration in progress: migrated {migrated} of {to_do} histories \
                 (in {:?})",
                started.elapsed()
            );
        }
        self.set_migration_complete(Some(complete));

        Ok(MigrationRun {
            to_do,
            migrated,
            already_migrated,
            failed,
            batch_count,
            failed_batches,
            complete,
            elapsed: started.elapsed(),
        })
    }

    /// One batch, one transaction, bounded retries on transient faults. Any
    /// other failure abandons the batch whole: no history in it is marked.
    async fn run_migration_batch(
        &self,
        batch: &[NodeRef],
        config: &MigrationConfig,
    ) -> Result<(), VersionServiceError> {
        let mut attempts = 0u32;
        loop {
            self.store.begin_transaction().await?;
            let mut outcome = Ok(());
            for history in batch {
                if let Err(err) = self.migrate_one(history, config.delete_immediately).await {
                    outcome = Err(err);
                    break;
                }
            }
            match outcome {
                Ok(()) => {
                    self.store.commit_transaction().await?;
                    return Ok(());
                }
                Err(err) => {
                    self.store.rollback_transaction().await?;
                    if err.is_transient() && attempts < config.max_retries {
                        attempts += 1;
                        tracing::debug!(
                            "transient fault in migration batch (attempt {attempts}): {err}, retrying"
                        );
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    //
    // CLEANUP
    //

    /// Delete confirmed-migrated legacy histories in batches.
    ///
    /// Returns `Ok(None)` when another cleanup run is already active - the
    /// busy guard makes concurrent triggers no-ops, not queued work.
    pub async fn execute_cleanup(
        &self,
        batch_size: usize,
        thread_count: usize,
    ) -> Result<Option<CleanupRun>, VersionServiceError> {
        if self
            .cleanup_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("version store cleanup already running, ignoring trigger");
            return Ok(None);
        }
        let result = self.cleanup_inner(batch_size, thread_count).await;
        self.cleanup_busy.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn cleanup_inner(
        &self,
        batch_size: usize,
        thread_count: usize,
    ) -> Result<CleanupRun, VersionServiceError> {
        let config = MigrationConfig {
            batch_size,
            thread_count,
            ..MigrationConfig::default()
        };
        config.validate()?;
        let started = Instant::now();

        let histories = self.legacy_histories().await?;
        let to_do = histories.len();
        if to_do == 0 {
            self.set_migration_complete(Some(true));
            return Ok(CleanupRun {
                to_do: 0,
                deleted: 0,
                not_migrated: 0,
                failed: 0,
                elapsed: started.elapsed(),
            });
        }
        tracing::info!(
            "found {to_do} version histories to delete from legacy version store (in {:?})",
            started.elapsed()
        );

        let mut not_migrated = 0usize;
        let mut work = Vec::new();
        for assoc in &histories {
            if self.is_migrated(&assoc.child).await? {
                work.push(assoc.child.clone());
            } else {
                not_migrated += 1;
            }
        }

        let mut progress = BatchProgress::new("version store cleanup", work.len());
        let mut deleted = 0usize;
        let mut failed = 0usize;

        for batch in work.chunks(batch_size) {
            // A failing member is excluded and the remainder retried, until
            // the batch drains or empties.
            let mut remaining: Vec<NodeRef> = batch.to_vec();
            while !remaining.is_empty() {
                self.store.begin_transaction().await?;
                match self.delete_batch(&remaining).await {
                    Ok(()) => {
                        self.store.commit_transaction().await?;
                        deleted += remaining.len();
                        for _ in 0..remaining.len() {
                            progress.item_processed();
                        }
                        break;
                    }
                    Err((index, err)) => {
                        self.store.rollback_transaction().await?;
                        let culprit = remaining.remove(index);
                        failed += 1;
                        progress.item_processed();
                        tracing::warn!(
                            "failed to delete migrated history {culprit}: {err}; \
                             retrying batch without it"
                        );
                    }
                }
            }
        }

        if not_migrated > 0 {
            tracing::warn!("skipped {not_migrated} version histories not marked as migrated");
        }
        if failed > 0 {
            tracing::warn!(
                "version store cleanup: failed to delete {failed} histories (in {:?})",
                started.elapsed()
            );
        } else {
            tracing::info!(
                "version store cleanup complete: deleted {deleted} of {to_do} histories \
                 (in {:?})",
                started.elapsed()
            );
        }
        if not_migrated == 0 && failed == 0 {
            self.set_migration_complete(None);
            self.is_migration_complete().await?;
        }

        Ok(CleanupRun {
            to_do,
            deleted,
            not_migrated,
            failed,
            elapsed: started.elapsed(),
        })
    }

    async fn delete_batch(
        &self,
        batch: &[NodeRef],
    ) -> Result<(), (usize, VersionServiceError)> {
        for (index, history) in batch.iter().enumerate() {
            if let Err(err) = self.legacy.delete_version_history(history).await {
                return Err((index, err));
            }
        }
        Ok(())
    }

    /// Stable snapshot of the legacy store's history children.
    async fn legacy_histories(
        &self,
    ) -> Result<Vec<crate::models::ChildAssoc>, VersionServiceError> {
        let root = self.legacy.root_node().await?;
        Ok(self
            .store
            .child_assocs_of_type(&root, &self.legacy.schema().assoc_version_histories)
            .await?)
    }
}
