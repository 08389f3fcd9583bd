//! Qualified Names
//!
//! Every type, aspect, property and association key in the repository is
//! addressed by a namespaced name. The total ordering on `QName` matters:
//! reconstructed frozen associations are sorted by it so that readers see the
//! same deterministic order the associations had when they were frozen.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A namespaced name, e.g. `content:name` or `version2:versionLabel`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    namespace: String,
    local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// True if this name lives in the given namespace.
    pub fn is_in(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.local_name)
    }
}
