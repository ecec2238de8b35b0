use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::{Edge, Entity, PropertyValue};
use crate::types::{EdgeTypeId, LabelId, PropertyId};

/// Predicate an index key imposes on a record payload.
pub trait IndexPredicate<T> {
    /// Returns `true` when `data` satisfies the key.
    fn matches(&self, data: &T) -> bool;
}

impl<T: Entity> IndexPredicate<T> for LabelId {
    fn matches(&self, data: &T) -> bool {
        data.has_label(*self)
    }
}

impl IndexPredicate<Edge> for EdgeTypeId {
    fn matches(&self, data: &Edge) -> bool {
        data.edge_type == *self
    }
}

/// Key of the label-property index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LabelPropertyKey {
    /// Label the entity must carry.
    pub label: LabelId,
    /// Property the entity must have set.
    pub property: PropertyId,
}

impl LabelPropertyKey {
    /// Creates a key.
    pub fn new(label: LabelId, property: PropertyId) -> Self {
        Self { label, property }
    }
}

impl fmt::Display for LabelPropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}({})", self.label, self.property)
    }
}

impl<T: Entity> IndexPredicate<T> for LabelPropertyKey {
    fn matches(&self, data: &T) -> bool {
        data.has_label(self.label) && data.properties().contains(self.property)
    }
}

/// Label-property key narrowed to one property value.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPropertyValue {
    /// Underlying key.
    pub key: LabelPropertyKey,
    /// Value the property must equal.
    pub value: PropertyValue,
}

impl<T: Entity> IndexPredicate<T> for LabelPropertyValue {
    fn matches(&self, data: &T) -> bool {
        data.has_label(self.key.label)
            && data.properties().at(self.key.property).value_eq(&self.value)
    }
}
