use std::sync::Arc;

use crate::mvcc::{Record, VersionList, View};
use crate::storage::{Edge, Entity};
use crate::txn::{CommitLog, Transaction, Watermark};
use crate::types::{EdgeTypeId, LabelId};

use super::core::{IndexState, IndexedVlists, KeyIndex};

/// Index from label to the version lists that carry it.
///
/// Keys come into existence on first update and are immediately ready.
pub struct LabelIndex<T> {
    inner: KeyIndex<LabelId, T>,
}

impl<T> Default for LabelIndex<T> {
    fn default() -> Self {
        Self {
            inner: KeyIndex::default(),
        }
    }
}

impl<T: Entity> LabelIndex<T> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `record` of `vlist` carries `label`.
    pub fn update(&self, label: LabelId, vlist: &Arc<VersionList<T>>, record: &Arc<Record<T>>) {
        self.inner.insert(label, vlist, record, true);
    }

    /// Version lists visible to `tx` that carry `label`.
    pub fn get_vlists<'a>(
        &self,
        label: LabelId,
        tx: &'a Transaction,
        view: View,
    ) -> IndexedVlists<'a, LabelId, T> {
        IndexedVlists::new(self.inner.candidates(label), label, tx, view)
    }

    /// Raw entry count for `label`; zero when nothing was indexed.
    pub fn count(&self, label: LabelId) -> usize {
        self.inner.count(label).unwrap_or(0)
    }

    /// Labels with at least one update.
    pub fn keys(&self) -> Vec<LabelId> {
        self.inner.keys(Some(IndexState::Ready))
    }

    /// Drops stale entries; returns how many were removed.
    pub fn refresh(&self, watermark: &Watermark, clog: &CommitLog) -> usize {
        self.inner.refresh(watermark, clog)
    }
}

/// Index from edge type to edge version lists.
#[derive(Default)]
pub struct EdgeTypeIndex {
    inner: KeyIndex<EdgeTypeId, Edge>,
}

impl EdgeTypeIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `record` of `vlist` has `edge_type`.
    pub fn update(
        &self,
        edge_type: EdgeTypeId,
        vlist: &Arc<VersionList<Edge>>,
        record: &Arc<Record<Edge>>,
    ) {
        self.inner.insert(edge_type, vlist, record, true);
    }

    /// Edge version lists visible to `tx` with `edge_type`.
    pub fn get_vlists<'a>(
        &self,
        edge_type: EdgeTypeId,
        tx: &'a Transaction,
        view: View,
    ) -> IndexedVlists<'a, EdgeTypeId, Edge> {
        IndexedVlists::new(self.inner.candidates(edge_type), edge_type, tx, view)
    }

    /// Raw entry count for `edge_type`.
    pub fn count(&self, edge_type: EdgeTypeId) -> usize {
        self.inner.count(edge_type).unwrap_or(0)
    }

    /// Edge types with at least one update.
    pub fn keys(&self) -> Vec<EdgeTypeId> {
        self.inner.keys(Some(IndexState::Ready))
    }

    /// Drops stale entries; returns how many were removed.
    pub fn refresh(&self, watermark: &Watermark, clog: &CommitLog) -> usize {
        self.inner.refresh(watermark, clog)
    }
}
