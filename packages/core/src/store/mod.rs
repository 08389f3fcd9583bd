//! Store Layer
//!
//! The boundary to the transactional node graph:
//!
//! - [`NodeStore`] - the consumed node-store contract (nodes, properties,
//!   aspects, associations, ambient transactions)
//! - [`ContentMetadataStore`] - numeric content reference resolution
//! - [`AuditSwitch`] - scoped suspension of automatic auditable-property
//!   stamping
//! - [`MemoryStore`] - in-memory reference backend

pub mod audit;
pub mod error;
pub mod memory;
pub mod node_store;

pub use audit::{AuditPause, AuditSwitch};
pub use error::StoreError;
pub use memory::{MemoryContentStore, MemoryStore};
pub use node_store::{ContentMetadataStore, NodeStore};
