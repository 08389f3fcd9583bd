//! Association Records
//!
//! Child associations are the ordered parent/child edges of the graph; peer
//! associations are unordered typed references between nodes. Both derive
//! `Ord`: when frozen associations are reconstructed from a version node they
//! are sorted into this natural order, so callers observe the same sequence
//! regardless of the physical creation order of the capture nodes.

use crate::models::{NodeRef, QName};
use serde::{Deserialize, Serialize};

/// A parent/child edge.
///
/// Natural order is sibling index first, then association type, qualified
/// name and finally the child reference as a tiebreak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildAssoc {
    pub parent: NodeRef,
    pub child: NodeRef,
    pub assoc_type: QName,
    pub qname: QName,
    pub is_primary: bool,
    pub nth_sibling: i32,
}

impl PartialOrd for ChildAssoc {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChildAssoc {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.nth_sibling
            .cmp(&other.nth_sibling)
            .then_with(|| self.assoc_type.cmp(&other.assoc_type))
            .then_with(|| self.qname.cmp(&other.qname))
            .then_with(|| self.child.cmp(&other.child))
    }
}

/// An unordered typed reference between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAssoc {
    pub source: NodeRef,
    pub target: NodeRef,
    pub assoc_type: QName,
}

impl PartialOrd for PeerAssoc {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PeerAssoc {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.assoc_type
            .cmp(&other.assoc_type)
            .then_with(|| self.target.cmp(&other.target))
            .then_with(|| self.source.cmp(&other.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreRef;

    fn child_assoc(nth: i32, child_id: &str) -> ChildAssoc {
        let store = StoreRef::new("workspace", "spaces");
        ChildAssoc {
            parent: NodeRef::new(store.clone(), "parent"),
            child: NodeRef::new(store, child_id),
            assoc_type: QName::new("sys", "children"),
            qname: QName::new("content", child_id),
            is_primary: true,
            nth_sibling: nth,
        }
    }

    #[test]
    fn test_child_assoc_orders_by_sibling_index() {
        let mut assocs = vec![child_assoc(2, "c"), child_assoc(0, "a"), child_assoc(1, "b")];
        assocs.sort();
        let ids: Vec<&str> = assocs.iter().map(|a| a.child.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_child_assoc_tiebreak_on_child_ref() {
        let mut assocs = vec![child_assoc(0, "b"), child_assoc(0, "a")];
        assocs.sort();
        assert_eq!(assocs[0].child.id(), "a");
    }
}
