//! Service Layer Error Types
//!
//! Error types for the version services, the migration engine and the job
//! surface. Branching and corruption faults are deliberately loud: they mean
//! the data violates invariants the schemas are built on, not that a caller
//! did something retryable.

use crate::models::NodeRef;
use crate::store::StoreError;
use thiserror::Error;

/// Version service and migration errors.
#[derive(Error, Debug)]
pub enum VersionServiceError {
    /// No version history exists for the given live-node identifier.
    #[error("Version history not found for node id: {node_id}")]
    HistoryNotFound { node_id: String },

    /// A version expected to exist could not be located.
    #[error("Version not found: {context}")]
    VersionNotFound { context: String },

    /// A version carries more than one successor link. Version histories do
    /// not branch; this is a data-integrity fault.
    #[error("Branching version history detected at {node}")]
    BranchingDetected { node: NodeRef },

    /// The history's structure contradicts its own invariants (multiple
    /// predecessors, current version not at the head, missing frozen
    /// fields).
    #[error("Corrupt version history: {context}")]
    CorruptHistory { context: String },

    /// Mutation attempted through the read-only facade.
    #[error("Version stores are read-only: {operation} is not supported")]
    ReadOnlyVersionStore { operation: &'static str },

    /// The node reference does not belong to either version store.
    #[error("Node is not held in a version store: {node}")]
    NotAVersionNode { node: NodeRef },

    /// Fatal configuration fault; the run aborts before any work.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Underlying store failure.
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl VersionServiceError {
    pub fn history_not_found(node_id: impl Into<String>) -> Self {
        Self::HistoryNotFound {
            node_id: node_id.into(),
        }
    }

    pub fn version_not_found(context: impl Into<String>) -> Self {
        Self::VersionNotFound {
            context: context.into(),
        }
    }

    pub fn corrupt_history(context: impl Into<String>) -> Self {
        Self::CorruptHistory {
            context: context.into(),
        }
    }

    pub fn read_only(operation: &'static str) -> Self {
        Self::ReadOnlyVersionStore { operation }
    }

    /// Whether retrying the enclosing transaction could help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}
