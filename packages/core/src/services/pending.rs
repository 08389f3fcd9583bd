//! Pending Node State
//!
//! The scope object handed to the freeze routine: the full description of a
//! node about to be captured as a version. Properties are grouped under the
//! class (type or aspect) that introduces them, matching how the freeze
//! routine writes them out. Both the normal snapshot path and the migration
//! path assemble one of these, which is what keeps migrated versions
//! schema-identical to natively created ones.

use crate::models::{ChildAssoc, PeerAssoc, PropertyMap, PropertyValue, QName};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct PendingNodeState {
    node_type: QName,
    /// Per-class property groups; the map under the node type is the main
    /// property set.
    properties: Vec<(QName, PropertyMap)>,
    aspects: BTreeSet<QName>,
    child_assocs: Vec<ChildAssoc>,
    peer_assocs: Vec<PeerAssoc>,
}

impl PendingNodeState {
    pub fn new(node_type: QName) -> Self {
        Self {
            node_type,
            properties: Vec::new(),
            aspects: BTreeSet::new(),
            child_assocs: Vec::new(),
            peer_assocs: Vec::new(),
        }
    }

    pub fn node_type(&self) -> &QName {
        &self.node_type
    }

    pub fn add_property(&mut self, class: &QName, key: QName, value: PropertyValue) {
        match self.properties.iter_mut().find(|(c, _)| c == class) {
            Some((_, map)) => {
                map.insert(key, value);
            }
            None => {
                let mut map = PropertyMap::new();
                map.insert(key, value);
                self.properties.push((class.clone(), map));
            }
        }
    }

    pub fn add_aspect(&mut self, aspect: QName) {
        self.aspects.insert(aspect);
    }

    pub fn add_child_assoc(&mut self, assoc: ChildAssoc) {
        self.child_assocs.push(assoc);
    }

    pub fn add_peer_assoc(&mut self, assoc: PeerAssoc) {
        self.peer_assocs.push(assoc);
    }

    /// Properties grouped under the given class; empty if none were added.
    pub fn class_properties(&self, class: &QName) -> PropertyMap {
        self.properties
            .iter()
            .find(|(c, _)| c == class)
            .map(|(_, map)| map.clone())
            .unwrap_or_default()
    }

    /// Properties grouped under the node type itself.
    pub fn type_properties(&self) -> PropertyMap {
        self.class_properties(&self.node_type)
    }

    pub fn aspects(&self) -> &BTreeSet<QName> {
        &self.aspects
    }

    pub fn child_assocs(&self) -> &[ChildAssoc] {
        &self.child_assocs
    }

    pub fn peer_assocs(&self) -> &[PeerAssoc] {
        &self.peer_assocs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_group_by_class() {
        let doc = QName::new("content", "document");
        let auditable = QName::new("content", "auditable");
        let mut pending = PendingNodeState::new(doc.clone());
        pending.add_property(&doc, QName::new("content", "name"), "a".into());
        pending.add_property(&auditable, QName::new("content", "creator"), "u".into());

        assert_eq!(pending.type_properties().len(), 1);
        assert_eq!(pending.class_properties(&auditable).len(), 1);
        assert!(pending
            .class_properties(&QName::new("content", "emailed"))
            .is_empty());
    }

    #[test]
    fn test_later_add_overwrites_same_key() {
        let doc = QName::new("content", "document");
        let mut pending = PendingNodeState::new(doc.clone());
        let key = QName::new("content", "name");
        pending.add_property(&doc, key.clone(), "first".into());
        pending.add_property(&doc, key.clone(), "second".into());
        assert_eq!(
            pending.type_properties().get(&key).unwrap().as_text(),
            Some("second")
        );
    }
}
