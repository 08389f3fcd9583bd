//! Aspect Dictionary
//!
//! Aspects bring properties with them: when a frozen node's state is
//! reassembled for re-creation, the properties a class (type or aspect)
//! introduces have to be grouped under that class. The dictionary is the
//! lookup from class name to the property keys it defines. It is deliberately
//! small; model deployment is someone else's job.

use crate::models::schema::content_model;
use crate::models::QName;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    classes: HashMap<QName, BTreeSet<QName>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dictionary pre-loaded with the content-model aspects this crate
    /// depends on (the auditable property set in particular).
    pub fn with_content_model() -> Self {
        let mut dictionary = Self::new();
        dictionary.register_class(
            content_model::aspect_auditable(),
            content_model::auditable_properties(),
        );
        dictionary.register_class(
            content_model::aspect_versionable(),
            vec![content_model::prop_version_label()],
        );
        dictionary.register_class(content_model::aspect_working_copy(), Vec::new());
        dictionary
    }

    pub fn register_class(
        &mut self,
        class: QName,
        properties: impl IntoIterator<Item = QName>,
    ) {
        self.classes
            .entry(class)
            .or_default()
            .extend(properties);
    }

    /// Property keys introduced by the given class, if it is known.
    pub fn properties_of(&self, class: &QName) -> Option<&BTreeSet<QName>> {
        self.classes.get(class)
    }

    pub fn is_registered(&self, class: &QName) -> bool {
        self.classes.contains_key(class)
    }
}
