//! Version Services
//!
//! The business layer over the node store:
//!
//! - `VersionNodeService` - dual-schema read facade over frozen version
//!   nodes
//! - `HistoryBuilder` - ordered chain reconstruction for either schema
//! - `LegacyVersionService` / `VersionService` - per-schema decode and
//!   creation primitives
//! - `VersionMigrator` - batched, resumable legacy-to-current rewrite and
//!   cleanup
//! - `MigrationJob` - the operator-facing trigger surface
//!
//! Services coordinate between the store layer and the migration logic,
//! owning transaction boundaries and the invariants of the version graph.

pub mod error;
pub mod history_builder;
pub mod label;
pub mod legacy_version_service;
pub mod migration_job;
pub mod migrator;
pub mod pending;
pub mod progress;
pub mod version_node_service;
pub mod version_service;

pub use error::VersionServiceError;
pub use history_builder::HistoryBuilder;
pub use legacy_version_service::LegacyVersionService;
pub use migration_job::{MigrationJob, MigrationJobConfig};
pub use migrator::{
    CleanupRun, MigrationConfig, MigrationRun, VersionMigrator, MIGRATED_NAME_PREFIX,
};
pub use pending::PendingNodeState;
pub use progress::BatchProgress;
pub use version_node_service::{FrozenEncoding, VersionNodeService};
pub use version_service::VersionService;
