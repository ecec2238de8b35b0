use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::PropertyId;

use super::value::PropertyValue;

static NULL: PropertyValue = PropertyValue::Null;

/// Small map from property id to value, kept sorted by id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "UnorderedEntries")]
pub struct PropertyMap {
    entries: SmallVec<[(PropertyId, PropertyValue); 4]>,
}

/// Wire form of [`PropertyMap`]; entries may arrive in any order.
#[derive(Deserialize)]
struct UnorderedEntries {
    entries: Vec<(PropertyId, PropertyValue)>,
}

impl From<UnorderedEntries> for PropertyMap {
    fn from(raw: UnorderedEntries) -> Self {
        let mut map = Self::new();
        for (key, value) in raw.entries {
            map.set(key, value);
        }
        map
    }
}

impl PropertyMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, or [`PropertyValue::Null`] when absent.
    pub fn at(&self, key: PropertyId) -> &PropertyValue {
        match self.position(key) {
            Ok(pos) => &self.entries[pos].1,
            Err(_) => &NULL,
        }
    }

    /// Returns `true` when `key` holds a non-null value.
    pub fn contains(&self, key: PropertyId) -> bool {
        self.position(key).is_ok()
    }

    /// Sets `key` to `value`. Setting [`PropertyValue::Null`] erases the key.
    pub fn set(&mut self, key: PropertyId, value: PropertyValue) {
        if value.is_null() {
            self.erase(key);
            return;
        }
        match self.position(key) {
            Ok(pos) => self.entries[pos].1 = value,
            Err(pos) => self.entries.insert(pos, (key, value)),
        }
    }

    /// Removes `key`, returning whether it was present.
    pub fn erase(&mut self, key: PropertyId) -> bool {
        match self.position(key) {
            Ok(pos) => {
                self.entries.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes every property.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyValue)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no properties.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: PropertyId) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&key, |(k, _)| *k)
    }
}
