//! Verso Version-Store Core
//!
//! This crate migrates the historical-version graph of a content repository
//! from its legacy storage schema to the current one, and exposes a read-only
//! facade that answers one logical node contract over either physical
//! encoding.
//!
//! # Architecture
//!
//! - **Dual encoding, one contract**: the legacy schema materializes every
//!   frozen property and association as capture child nodes; the current
//!   schema keeps the property map on the version node. The facade dispatches
//!   on store identity and decodes either.
//! - **Batched, resumable rewrite**: the migrator walks legacy histories in
//!   fixed-size transactional batches; the only persistent done-bit is a
//!   reversible name-prefix marker, which makes every re-run idempotent.
//! - **External node store**: the transactional graph itself is a
//!   collaborator behind the [`store::NodeStore`] trait; an in-memory
//!   reference backend drives the test suite.
//!
//! # Modules
//!
//! - [`models`] - data model (names, refs, properties, associations,
//!   versions, schema vocabulary)
//! - [`store`] - node-store and content-lookup contracts, audit switch,
//!   in-memory backend
//! - [`services`] - facade, history builder, version services, migrator,
//!   job surface

pub mod logging;
pub mod models;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use models::*;
pub use services::*;
pub use store::*;
