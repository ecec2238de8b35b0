use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::mvcc::View;
use crate::storage::{Edge, Vertex};
use crate::types::{GraphError, Gid, Result, TxId};

/// Old and new versions of one remote entity as seen by a transaction.
#[derive(Debug)]
struct CachedPair<T> {
    old: Option<Arc<T>>,
    new: Option<Arc<T>>,
}

/// Per-transaction cache of remote entity versions of one kind.
pub struct RemoteCache<T> {
    by_tx: Mutex<FxHashMap<TxId, FxHashMap<Gid, CachedPair<T>>>>,
}

impl<T> Default for RemoteCache<T> {
    fn default() -> Self {
        Self {
            by_tx: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<T> RemoteCache<T> {
    /// Caches versions of `gid` for `tx`. The first emplacement wins.
    pub fn emplace(&self, tx: TxId, gid: Gid, old: Option<T>, new: Option<T>) {
        self.by_tx
            .lock()
            .entry(tx)
            .or_default()
            .entry(gid)
            .or_insert_with(|| CachedPair {
                old: old.map(Arc::new),
                new: new.map(Arc::new),
            });
    }

    /// Version of `gid` for `tx` in `view`.
    ///
    /// Fails with [`GraphError::Reconstruction`] when the entity was never
    /// transferred or the requested version is absent.
    pub fn find(&self, tx: TxId, gid: Gid, view: View) -> Result<Arc<T>> {
        let guard = self.by_tx.lock();
        let pair = guard
            .get(&tx)
            .and_then(|cache| cache.get(&gid))
            .ok_or_else(|| GraphError::Reconstruction(format!("{gid} not transferred to {tx}")))?;
        let record = match view {
            View::Old => &pair.old,
            View::New => &pair.new,
        };
        record
            .clone()
            .ok_or_else(|| GraphError::Reconstruction(format!("{gid} has no {view:?} version in {tx}")))
    }

    /// Returns `true` when `tx` has versions of `gid` cached.
    pub fn contains(&self, tx: TxId, gid: Gid) -> bool {
        self.by_tx
            .lock()
            .get(&tx)
            .is_some_and(|cache| cache.contains_key(&gid))
    }

    /// Number of entities cached for `tx`.
    pub fn len_for(&self, tx: TxId) -> usize {
        self.by_tx.lock().get(&tx).map_or(0, |cache| cache.len())
    }

    fn clear_tx(&self, tx: TxId) {
        self.by_tx.lock().remove(&tx);
    }

    fn clear_older_than(&self, oldest_active: TxId) -> usize {
        let mut guard = self.by_tx.lock();
        let before = guard.len();
        guard.retain(|tx, _| *tx >= oldest_active);
        before - guard.len()
    }
}

/// Remote vertex and edge versions fetched on behalf of local transactions.
#[derive(Default)]
pub struct RemoteDataManager {
    vertices: RemoteCache<Vertex>,
    edges: RemoteCache<Edge>,
}

impl RemoteDataManager {
    /// Creates empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote vertex cache.
    pub fn vertices(&self) -> &RemoteCache<Vertex> {
        &self.vertices
    }

    /// Remote edge cache.
    pub fn edges(&self) -> &RemoteCache<Edge> {
        &self.edges
    }

    /// Drops everything cached for `tx`.
    pub fn clear_cache_for_single_transaction(&self, tx: TxId) {
        self.vertices.clear_tx(tx);
        self.edges.clear_tx(tx);
    }

    /// Drops caches of every transaction older than `oldest_active`.
    pub fn clear_transactional_cache(&self, oldest_active: TxId) {
        let cleared =
            self.vertices.clear_older_than(oldest_active) + self.edges.clear_older_than(oldest_active);
        if cleared > 0 {
            trace!(oldest_active, cleared, "distributed.cache.cleared");
        }
    }
}

impl std::fmt::Debug for RemoteDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDataManager")
            .field("vertex_txs", &self.vertices.by_tx.lock().len())
            .field("edge_txs", &self.edges.by_tx.lock().len())
            .finish()
    }
}
