use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::mvcc::{Record, VersionList, View};
use crate::txn::{CommitLog, Transaction, Watermark};
use crate::types::Gid;

use super::key::IndexPredicate;

/// Lifecycle state of an index key. Absence from the index is `UNKNOWN`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexState {
    /// Created; the initial scan is still inserting entries.
    Building,
    /// Scan finished; the key can be counted and queried.
    Ready,
}

struct Bucket<T> {
    vlist: Arc<VersionList<T>>,
    records: SmallVec<[Arc<Record<T>>; 2]>,
}

type Entries<T> = Arc<RwLock<FxHashMap<Gid, Bucket<T>>>>;

struct KeySlot<T> {
    state: IndexState,
    entries: Entries<T>,
}

/// Concurrent map from index keys to (version list, record) entries.
///
/// Entries for one version list are grouped in a bucket so lookups yield each
/// version list once. Inserts and refreshes of one key are serialized by that
/// key's entry lock; the outer lock only guards the key set.
pub struct KeyIndex<K, T> {
    keys: RwLock<FxHashMap<K, KeySlot<T>>>,
}

impl<K, T> Default for KeyIndex<K, T> {
    fn default() -> Self {
        Self {
            keys: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<K, T> KeyIndex<K, T>
where
    K: Copy + Eq + Hash + Ord + IndexPredicate<T>,
    T: Clone,
{
    /// Adds `key` in `state`; returns `false` when it already exists.
    pub fn create(&self, key: K, state: IndexState) -> bool {
        let mut keys = self.keys.write();
        if keys.contains_key(&key) {
            return false;
        }
        keys.insert(
            key,
            KeySlot {
                state,
                entries: Arc::default(),
            },
        );
        true
    }

    /// Moves `key` to `state`; returns `false` when the key is unknown.
    pub fn set_state(&self, key: K, state: IndexState) -> bool {
        match self.keys.write().get_mut(&key) {
            Some(slot) => {
                slot.state = state;
                true
            }
            None => false,
        }
    }

    /// State of `key`, or `None` when unknown.
    pub fn state(&self, key: K) -> Option<IndexState> {
        self.keys.read().get(&key).map(|slot| slot.state)
    }

    /// Removes `key` with all its entries.
    pub fn remove(&self, key: K) -> bool {
        self.keys.write().remove(&key).is_some()
    }

    /// Known keys in ascending order, optionally filtered by state.
    pub fn keys(&self, state: Option<IndexState>) -> Vec<K> {
        let mut keys: Vec<K> = self
            .keys
            .read()
            .iter()
            .filter(|(_, slot)| state.map_or(true, |s| slot.state == s))
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Records `record` of `vlist` under `key`, creating a ready key when `implicit`.
    ///
    /// Returns `true` when a new entry was added; repeated inserts of the same
    /// record are no-ops.
    pub fn insert(
        &self,
        key: K,
        vlist: &Arc<VersionList<T>>,
        record: &Arc<Record<T>>,
        implicit: bool,
    ) -> bool {
        let entries = match self.entries(key) {
            Some(entries) => entries,
            None if implicit => {
                self.create(key, IndexState::Ready);
                match self.entries(key) {
                    Some(entries) => entries,
                    None => return false,
                }
            }
            None => return false,
        };
        let mut entries = entries.write();
        let bucket = entries.entry(vlist.gid()).or_insert_with(|| Bucket {
            vlist: Arc::clone(vlist),
            records: SmallVec::new(),
        });
        if bucket.records.iter().any(|r| Arc::ptr_eq(r, record)) {
            return false;
        }
        bucket.records.push(Arc::clone(record));
        true
    }

    /// Raw number of entries under `key`, without revalidation.
    pub fn count(&self, key: K) -> Option<usize> {
        let entries = self.entries(key)?;
        let entries = entries.read();
        Some(entries.values().map(|b| b.records.len()).sum())
    }

    /// Version lists currently indexed under `key`.
    pub fn candidates(&self, key: K) -> Vec<Arc<VersionList<T>>> {
        match self.entries(key) {
            Some(entries) => entries
                .read()
                .values()
                .map(|b| Arc::clone(&b.vlist))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drops entries no reader at or after `watermark` can match.
    ///
    /// Per version list, records that are still potentially visible and
    /// satisfy the key are kept. When none remain, the newest potentially
    /// visible matching record of the chain is adopted instead, so updates
    /// that were never indexed do not become false negatives. Returns the
    /// number of entries removed.
    pub fn refresh(&self, watermark: &Watermark, clog: &CommitLog) -> usize {
        let slots: Vec<(K, Entries<T>)> = self
            .keys
            .read()
            .iter()
            .map(|(key, slot)| (*key, Arc::clone(&slot.entries)))
            .collect();
        let mut removed = 0usize;
        for (key, entries) in slots {
            let mut entries = entries.write();
            let before: usize = entries.values().map(|b| b.records.len()).sum();
            entries.retain(|_, bucket| {
                bucket
                    .records
                    .retain(|r| r.potentially_visible(watermark, clog) && key.matches(&*r.data()));
                if bucket.records.is_empty() {
                    let adopted = bucket.vlist.records().into_iter().find(|r| {
                        r.potentially_visible(watermark, clog) && key.matches(&*r.data())
                    });
                    match adopted {
                        Some(record) => bucket.records.push(record),
                        None => return false,
                    }
                }
                true
            });
            let after: usize = entries.values().map(|b| b.records.len()).sum();
            removed += before.saturating_sub(after);
        }
        removed
    }

    fn entries(&self, key: K) -> Option<Entries<T>> {
        self.keys
            .read()
            .get(&key)
            .map(|slot| Arc::clone(&slot.entries))
    }
}

/// Lazily revalidated result of an index lookup.
///
/// Candidates are captured once; every iteration re-reads the record visible
/// to the transaction and yields only version lists whose live state still
/// satisfies the predicate. Iterating twice yields the same result as long as
/// the transaction does not write in between.
pub struct IndexedVlists<'a, P, T> {
    candidates: Vec<Arc<VersionList<T>>>,
    predicate: P,
    tx: &'a Transaction,
    view: View,
}

impl<'a, P, T> IndexedVlists<'a, P, T>
where
    P: IndexPredicate<T>,
    T: Clone,
{
    pub(crate) fn new(
        candidates: Vec<Arc<VersionList<T>>>,
        predicate: P,
        tx: &'a Transaction,
        view: View,
    ) -> Self {
        Self {
            candidates,
            predicate,
            tx,
            view,
        }
    }

    /// Iterates matching version lists with the record that matched.
    pub fn iter(&self) -> impl Iterator<Item = (Arc<VersionList<T>>, Arc<Record<T>>)> + '_ {
        self.candidates.iter().filter_map(move |vlist| {
            let record = vlist.find_view(self.tx, self.view)?;
            let matches = self.predicate.matches(&*record.data());
            matches.then(|| (Arc::clone(vlist), record))
        })
    }

    /// Iterates matching version lists.
    pub fn vlists(&self) -> impl Iterator<Item = Arc<VersionList<T>>> + '_ {
        self.iter().map(|(vlist, _)| vlist)
    }

    /// Number of raw candidates before revalidation.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Number of version lists that currently match.
    pub fn count(&self) -> usize {
        self.iter().count()
    }
}
