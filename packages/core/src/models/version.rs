//! Version Descriptors
//!
//! A `Version` is the logical view of one frozen snapshot: its frozen-state
//! node in a version store, the live node it was taken from, its label, and
//! the metadata recorded when it was created. A `VersionHistory` is the
//! ordered chain of versions for one live node, root (oldest) first. Both are
//! schema-agnostic: the services decode either physical encoding into them.

use crate::models::{NodeRef, PropertyValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One frozen snapshot in a version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    frozen_node: NodeRef,
    versioned_node: NodeRef,
    label: String,
    description: Option<String>,
    created: Option<DateTime<Utc>>,
    metadata: BTreeMap<String, PropertyValue>,
}

impl Version {
    pub fn new(
        frozen_node: NodeRef,
        versioned_node: NodeRef,
        label: impl Into<String>,
    ) -> Self {
        Self {
            frozen_node,
            versioned_node,
            label: label.into(),
            description: None,
            created: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_created(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.created = created;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, PropertyValue>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The version node holding the frozen state, in its version store.
    pub fn frozen_node(&self) -> &NodeRef {
        &self.frozen_node
    }

    /// The live node this snapshot was taken from.
    pub fn versioned_node(&self) -> &NodeRef {
        &self.versioned_node
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    /// Caller-supplied metadata recorded when the version was created.
    pub fn metadata(&self) -> &BTreeMap<String, PropertyValue> {
        &self.metadata
    }

    pub fn metadata_value(&self, name: &str) -> Option<&PropertyValue> {
        self.metadata.get(name)
    }
}

/// Ordered chain of versions for one live node, root (oldest) first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHistory {
    versions: Vec<Version>,
}

impl VersionHistory {
    /// Build a history from versions already ordered root-first.
    pub fn new(versions: Vec<Version>) -> Self {
        Self { versions }
    }

    /// All versions, oldest first.
    pub fn all_versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn root_version(&self) -> Option<&Version> {
        self.versions.first()
    }

    pub fn head_version(&self) -> Option<&Version> {
        self.versions.last()
    }

    pub fn get_version(&self, label: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.label() == label)
    }

    /// The version immediately preceding the given label, if any.
    pub fn predecessor(&self, label: &str) -> Option<&Version> {
        let idx = self.versions.iter().position(|v| v.label() == label)?;
        if idx == 0 {
            None
        } else {
            self.versions.get(idx - 1)
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
