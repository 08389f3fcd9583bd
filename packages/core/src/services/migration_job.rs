//! Migration Job Surface
//!
//! The single operator-facing entry point. A trigger (scheduler, patch
//! runner, admin action) hands over a validated [`MigrationJobConfig`]; the
//! job builds one migrator per tenant, runs migration sequentially, and -
//! unless it is running as part of another job, which would double-delete -
//! follows a complete run with the standalone cleanup pass.

use crate::models::{Dictionary, SchemaDescriptor};
use crate::services::error::VersionServiceError;
use crate::services::migrator::{MigrationConfig, MigrationRun, VersionMigrator};
use crate::store::{ContentMetadataStore, NodeStore};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MigrationJobConfig {
    /// Histories per transactional batch (>= 1).
    pub batch_size: usize,
    /// Parallelism hint (>= 1); execution is sequential.
    pub thread_count: usize,
    /// Cap on histories migrated per tenant and cycle.
    pub limit: Option<usize>,
    /// Delete legacy histories in the migrating transaction instead of
    /// marking them for cleanup.
    pub delete_immediately: bool,
    /// Keep serving the legacy schema only; the job becomes a no-op.
    pub use_legacy_only: bool,
    /// Set when another job drives this one; suppresses the trailing
    /// standalone cleanup so histories are not deleted twice.
    pub run_as_part_of_job: bool,
    /// Also iterate the configured tenants after the default stores.
    pub migrate_all_tenants: bool,
    pub tenants: Vec<String>,
    /// Transaction retries per batch on transient faults.
    pub max_retries: u32,
}

impl Default for MigrationJobConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            thread_count: 1,
            limit: None,
            delete_immediately: false,
            use_legacy_only: false,
            run_as_part_of_job: false,
            migrate_all_tenants: false,
            tenants: Vec::new(),
            max_retries: 1,
        }
    }
}

impl MigrationJobConfig {
    pub fn validate(&self) -> Result<(), VersionServiceError> {
        self.migration_config().validate()
    }

    fn migration_config(&self) -> MigrationConfig {
        MigrationConfig {
            batch_size: self.batch_size,
            thread_count: self.thread_count,
            limit: self.limit,
            delete_immediately: self.delete_immediately,
            max_retries: self.max_retries,
        }
    }

    /// Tenant names this job iterates; the empty name is the default
    /// (unscoped) store pair.
    fn tenant_names(&self) -> Vec<String> {
        let mut names = vec![String::new()];
        if self.migrate_all_tenants {
            names.extend(self.tenants.iter().cloned());
        }
        names
    }
}

pub struct MigrationJob {
    store: Arc<dyn NodeStore>,
    content: Arc<dyn ContentMetadataStore>,
    dictionary: Arc<Dictionary>,
    config: MigrationJobConfig,
}

impl MigrationJob {
    pub fn new(
        store: Arc<dyn NodeStore>,
        content: Arc<dyn ContentMetadataStore>,
        dictionary: Arc<Dictionary>,
        config: MigrationJobConfig,
    ) -> Self {
        Self {
            store,
            content,
            dictionary,
            config,
        }
    }

    /// Run the job over every configured tenant.
    ///
    /// Configuration faults abort before any work. Per-tenant results are
    /// returned keyed by tenant name (empty for the default stores).
    pub async fn run(&self) -> anyhow::Result<Vec<(String, MigrationRun)>> {
        self.config
            .validate()
            .context("version store migration job configuration")?;

        if self.config.use_legacy_only {
            tracing::info!("legacy-only mode is set, skipping version store migration");
            return Ok(Vec::new());
        }

        let migration_config = self.config.migration_config();
        let mut runs = Vec::new();
        for tenant in self.config.tenant_names() {
            let migrator = self.migrator_for(&tenant);
            let run = migrator
                .migrate_all(&migration_config)
                .await
                .with_context(|| {
                    format!(
                        "migrating version store for tenant '{}'",
                        display_tenant(&tenant)
                    )
                })?;

            if run.complete && !self.config.delete_immediately && !self.config.run_as_part_of_job
            {
                migrator
                    .execute_cleanup(self.config.batch_size, self.config.thread_count)
                    .await
                    .with_context(|| {
                        format!(
                            "cleaning up version store for tenant '{}'",
                            display_tenant(&tenant)
                        )
                    })?;
            }
            runs.push((tenant, run));
        }
        Ok(runs)
    }

    /// The migrator for one tenant's store pair.
    pub fn migrator_for(&self, tenant: &str) -> VersionMigrator {
        VersionMigrator::with_schemas(
            self.store.clone(),
            self.content.clone(),
            self.dictionary.clone(),
            SchemaDescriptor::legacy().for_tenant(tenant),
            SchemaDescriptor::version2().for_tenant(tenant),
        )
    }
}

fn display_tenant(tenant: &str) -> &str {
    if tenant.is_empty() {
        "<default>"
    } else {
        tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MigrationJobConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_fatal() {
        let config = MigrationJobConfig {
            batch_size: 0,
            ..MigrationJobConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VersionServiceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_thread_count_is_fatal() {
        let config = MigrationJobConfig {
            thread_count: 0,
            ..MigrationJobConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tenant_iteration_list() {
        let config = MigrationJobConfig {
            migrate_all_tenants: true,
            tenants: vec!["acme".to_string(), "globex".to_string()],
            ..MigrationJobConfig::default()
        };
        assert_eq!(config.tenant_names(), vec!["", "acme", "globex"]);

        let default_only = MigrationJobConfig {
            tenants: vec!["acme".to_string()],
            ..MigrationJobConfig::default()
        };
        assert_eq!(default_only.tenant_names(), vec![""]);
    }
}
