use std::sync::Arc;

use tracing::{debug, error, info};

use crate::mvcc::{Record, VersionList, View};
use crate::storage::{Entity, PropertyValue};
use crate::txn::{CommitLog, Transaction, Watermark};
use crate::types::{LabelId, PropertyId};

use super::core::{IndexState, IndexedVlists, KeyIndex};
use super::key::{LabelPropertyKey, LabelPropertyValue};

/// Index from (label, property) to version lists carrying both.
///
/// Keys follow `UNKNOWN -> BUILDING -> READY`. Entries are inserted while
/// building so that a concurrent scan and live writers together cover every
/// match; only a ready key can be counted or is reported as existing.
pub struct LabelPropertyIndex<T> {
    inner: KeyIndex<LabelPropertyKey, T>,
}

impl<T> Default for LabelPropertyIndex<T> {
    fn default() -> Self {
        Self {
            inner: KeyIndex::default(),
        }
    }
}

impl<T: Entity> LabelPropertyIndex<T> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building `key`; returns `false` when it is already building or ready.
    pub fn create_index(&self, key: LabelPropertyKey) -> bool {
        let created = self.inner.create(key, IndexState::Building);
        if created {
            debug!(label = key.label.0, property = key.property.0, "index.label_property.created");
        }
        created
    }

    /// Marks `key` ready after its initial scan.
    ///
    /// # Panics
    ///
    /// Panics when `key` was never created.
    pub fn index_finished_building(&self, key: LabelPropertyKey) {
        if !self.inner.set_state(key, IndexState::Ready) {
            error!(label = key.label.0, property = key.property.0, "index.label_property.finish_unknown");
            panic!("index doesn't exist");
        }
        info!(label = key.label.0, property = key.property.0, "index.label_property.ready");
    }

    /// Returns `true` only once `key` is ready.
    pub fn index_exists(&self, key: LabelPropertyKey) -> bool {
        self.inner.state(key) == Some(IndexState::Ready)
    }

    /// Lifecycle state of `key`; `None` is `UNKNOWN`.
    pub fn state(&self, key: LabelPropertyKey) -> Option<IndexState> {
        self.inner.state(key)
    }

    /// Removes `key` and its entries, returning it to `UNKNOWN`.
    pub fn drop_index(&self, key: LabelPropertyKey) -> bool {
        let dropped = self.inner.remove(key);
        if dropped {
            info!(label = key.label.0, property = key.property.0, "index.label_property.dropped");
        }
        dropped
    }

    /// Ready keys in ascending order.
    pub fn keys(&self) -> Vec<LabelPropertyKey> {
        self.inner.keys(Some(IndexState::Ready))
    }

    /// Every known key, including those still building.
    pub fn all_keys(&self) -> Vec<LabelPropertyKey> {
        self.inner.keys(None)
    }

    /// Hook for a label added to `record`.
    pub fn update_on_label(&self, label: LabelId, vlist: &Arc<VersionList<T>>, record: &Arc<Record<T>>) {
        self.insert_matching(vlist, record, |key| key.label == label);
    }

    /// Hook for a property set on `record`.
    pub fn update_on_property(
        &self,
        property: PropertyId,
        vlist: &Arc<VersionList<T>>,
        record: &Arc<Record<T>>,
    ) {
        self.insert_matching(vlist, record, |key| key.property == property);
    }

    /// Inserts `record` under every key it satisfies.
    pub fn update_on_label_property(&self, vlist: &Arc<VersionList<T>>, record: &Arc<Record<T>>) {
        self.insert_matching(vlist, record, |_| true);
    }

    /// Version lists visible to `tx` whose live record satisfies `key`.
    ///
    /// # Panics
    ///
    /// Panics when `key` is unknown or still building.
    pub fn get_vlists<'a>(
        &self,
        key: LabelPropertyKey,
        tx: &'a Transaction,
        view: View,
    ) -> IndexedVlists<'a, LabelPropertyKey, T> {
        self.ensure_ready(key, "get_vlists");
        IndexedVlists::new(self.inner.candidates(key), key, tx, view)
    }

    /// Version lists visible to `tx` whose live record has `key.property == value`.
    ///
    /// # Panics
    ///
    /// Panics when `key` is unknown or still building.
    pub fn get_vlists_with_value<'a>(
        &self,
        key: LabelPropertyKey,
        value: PropertyValue,
        tx: &'a Transaction,
        view: View,
    ) -> IndexedVlists<'a, LabelPropertyValue, T> {
        self.ensure_ready(key, "get_vlists_with_value");
        IndexedVlists::new(
            self.inner.candidates(key),
            LabelPropertyValue { key, value },
            tx,
            view,
        )
    }

    /// Raw entry count of a ready key.
    ///
    /// # Panics
    ///
    /// Panics when `key` is unknown or still building.
    pub fn count(&self, key: LabelPropertyKey) -> usize {
        self.ensure_ready(key, "count");
        self.inner.count(key).unwrap_or(0)
    }

    /// Drops stale entries; returns how many were removed.
    pub fn refresh(&self, watermark: &Watermark, clog: &CommitLog) -> usize {
        self.inner.refresh(watermark, clog)
    }

    fn ensure_ready(&self, key: LabelPropertyKey, op: &'static str) {
        match self.inner.state(key) {
            Some(IndexState::Ready) => {}
            None => {
                error!(label = key.label.0, property = key.property.0, op, "index.label_property.unknown");
                panic!("index doesn't exist");
            }
            Some(IndexState::Building) => {
                error!(label = key.label.0, property = key.property.0, op, "index.label_property.building");
                panic!("index not yet ready");
            }
        }
    }

    fn insert_matching(
        &self,
        vlist: &Arc<VersionList<T>>,
        record: &Arc<Record<T>>,
        filter: impl Fn(&LabelPropertyKey) -> bool,
    ) {
        let satisfied: Vec<LabelPropertyKey> = {
            let data = record.data();
            self.inner
                .keys(None)
                .into_iter()
                .filter(|key| filter(key))
                .filter(|key| data.has_label(key.label) && data.properties().contains(key.property))
                .collect()
        };
        for key in satisfied {
            self.inner.insert(key, vlist, record, false);
        }
    }
}
