//! Store Layer Error Types

use crate::models::{NodeRef, StoreRef};
use thiserror::Error;

/// Node store operation errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Node does not exist (or no longer exists).
    #[error("Node not found: {node}")]
    NodeNotFound { node: NodeRef },

    /// The addressed store has not been created.
    #[error("Store not found: {store}")]
    StoreNotFound { store: StoreRef },

    /// A node with the supplied identifier already exists in the store.
    #[error("Duplicate node id in {store}: {id}")]
    DuplicateNodeId { store: StoreRef, id: String },

    /// Transaction control called out of order.
    #[error("No transaction in progress")]
    NoTransaction,

    /// Nested ambient transactions are not supported.
    #[error("A transaction is already in progress")]
    TransactionInProgress,

    /// Transient fault; the operation may succeed when retried.
    #[error("Transient store failure: {context}")]
    Transient { context: String },

    /// The operation was refused by the store.
    #[error("Operation refused: {context}")]
    Refused { context: String },

    /// Malformed input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    pub fn transient(context: impl Into<String>) -> Self {
        Self::Transient {
            context: context.into(),
        }
    }

    pub fn refused(context: impl Into<String>) -> Self {
        Self::Refused {
            context: context.into(),
        }
    }

    /// Whether a retry of the enclosing transaction is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}
