//! Data Model
//!
//! Shared value types for the version-store core:
//!
//! - [`QName`] - namespaced names for types, aspects, properties and
//!   association keys
//! - [`StoreRef`] / [`NodeRef`] - store and node addressing
//! - [`PropertyValue`] / [`PropertyMap`] - typed property values
//! - [`ChildAssoc`] / [`PeerAssoc`] - association records with the natural
//!   ordering frozen state is reported in
//! - [`Version`] / [`VersionHistory`] - logical version descriptors
//! - [`Dictionary`] - aspect-to-properties lookup
//! - [`schema`] - the vocabulary of the content model and both version-store
//!   schemas

pub mod assoc;
pub mod dictionary;
pub mod property;
pub mod qname;
pub mod refs;
pub mod schema;
pub mod version;

pub use assoc::{ChildAssoc, PeerAssoc};
pub use dictionary::Dictionary;
pub use property::{ContentData, PropertyMap, PropertyValue};
pub use qname::QName;
pub use refs::{NodeRef, StoreRef};
pub use schema::SchemaDescriptor;
pub use version::{Version, VersionHistory};
