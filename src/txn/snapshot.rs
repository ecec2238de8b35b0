use crate::types::TxId;

/// Sorted set of transaction ids that were active when a transaction began.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Snapshot {
    ids: Vec<TxId>,
}

impl Snapshot {
    /// Builds a snapshot from arbitrary ids, sorting and deduplicating them.
    pub fn new(mut ids: Vec<TxId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Returns `true` when `id` was active at snapshot time.
    pub fn contains(&self, id: TxId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Adds `id`, keeping the set sorted.
    pub fn insert(&mut self, id: TxId) {
        if let Err(pos) = self.ids.binary_search(&id) {
            self.ids.insert(pos, id);
        }
    }

    /// Removes `id` if present.
    pub fn remove(&mut self, id: TxId) {
        if let Ok(pos) = self.ids.binary_search(&id) {
            self.ids.remove(pos);
        }
    }

    /// Smallest id in the snapshot.
    pub fn front(&self) -> Option<TxId> {
        self.ids.first().copied()
    }

    /// Largest id in the snapshot.
    pub fn back(&self) -> Option<TxId> {
        self.ids.last().copied()
    }

    /// Number of ids in the snapshot.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` when the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = TxId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<TxId> for Snapshot {
    fn from_iter<I: IntoIterator<Item = TxId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
