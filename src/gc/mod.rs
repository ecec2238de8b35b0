//! Garbage collection of versions and index entries below the watermark.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::db::{GraphDb, Worker};
use crate::mvcc::VersionList;
use crate::txn::{CommitLog, Watermark};
use crate::types::{Gid, Result, TxId};

/// Statistics of one collection cycle.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GcStats {
    /// Oldest active transaction when the cycle started.
    pub watermark: TxId,
    /// Versions unlinked from chains.
    pub records_reclaimed: u64,
    /// Vertex version lists dropped from storage.
    pub vertices_removed: u64,
    /// Edge version lists dropped from storage.
    pub edges_removed: u64,
    /// Index entries pruned by refresh.
    pub index_entries_removed: u64,
    /// Wall time of the cycle.
    pub run_millis: u64,
}

impl GcStats {
    /// Returns `true` when the cycle reclaimed anything.
    pub fn made_progress(&self) -> bool {
        self.records_reclaimed > 0
            || self.vertices_removed > 0
            || self.edges_removed > 0
            || self.index_entries_removed > 0
    }
}

/// Runs collection cycles against a database.
pub struct GarbageCollector;

impl GarbageCollector {
    /// Runs one cycle: refresh every index, then prune every version list.
    ///
    /// Version lists are shared through `Arc`, so an index entry that still
    /// names a pruned list never dangles; refreshing first keeps the indexes
    /// from pinning lists the pruning step is about to drop.
    pub fn collect(db: &GraphDb) -> GcStats {
        let started = Instant::now();
        let engine = db.engine();
        let watermark = engine.gc_watermark();
        let clog = engine.commit_log();

        let index_entries_removed = db.label_index().refresh(&watermark, clog)
            + db.label_property_index().refresh(&watermark, clog)
            + db.edge_type_index().refresh(&watermark, clog);
        let (vertex_records, vertices_removed) = prune(db.vertex_map(), &watermark, clog);
        let (edge_records, edges_removed) = prune(db.edge_map(), &watermark, clog);
        db.remote_data()
            .clear_transactional_cache(watermark.oldest_active);

        let stats = GcStats {
            watermark: watermark.oldest_active,
            records_reclaimed: (vertex_records + edge_records) as u64,
            vertices_removed: vertices_removed as u64,
            edges_removed: edges_removed as u64,
            index_entries_removed: index_entries_removed as u64,
            run_millis: started.elapsed().as_millis() as u64,
        };
        db.metrics()
            .gc_cycle(stats.records_reclaimed, stats.index_entries_removed);
        log_stats(&stats);
        stats
    }
}

fn prune<T: Clone>(
    map: &RwLock<FxHashMap<Gid, Arc<VersionList<T>>>>,
    watermark: &Watermark,
    clog: &CommitLog,
) -> (usize, usize) {
    let vlists: Vec<Arc<VersionList<T>>> = map.read().values().cloned().collect();
    let mut reclaimed = 0usize;
    let mut dead = Vec::new();
    for vlist in vlists {
        let outcome = vlist.gc(watermark, clog);
        reclaimed += outcome.reclaimed_records;
        if outcome.fully_dead {
            dead.push(vlist);
        }
    }
    if dead.is_empty() {
        return (reclaimed, 0);
    }
    let mut map = map.write();
    let mut removed = 0usize;
    for vlist in dead {
        let same = map
            .get(&vlist.gid())
            .is_some_and(|current| Arc::ptr_eq(current, &vlist));
        if same {
            map.remove(&vlist.gid());
            removed += 1;
        }
    }
    (reclaimed, removed)
}

fn log_stats(stats: &GcStats) {
    if stats.made_progress() {
        info!(
            watermark = stats.watermark,
            records = stats.records_reclaimed,
            vertices = stats.vertices_removed,
            edges = stats.edges_removed,
            index_entries = stats.index_entries_removed,
            run_millis = stats.run_millis,
            "gc.cycle.completed"
        );
        return;
    }
    debug!(
        watermark = stats.watermark,
        run_millis = stats.run_millis,
        "gc.cycle.noop"
    );
}

/// Background thread running [`GarbageCollector::collect`] periodically.
///
/// Results are published through [`GraphDb::last_gc_stats`].
#[derive(Debug)]
pub struct GcWorker {
    worker: Worker,
}

impl GcWorker {
    /// Starts collecting every `interval`.
    pub fn spawn(db: &Arc<GraphDb>, interval: Duration) -> Result<Self> {
        let worker = Worker::spawn("graphcore-gc", interval, Arc::downgrade(db), |db| {
            db.collect_garbage();
        })?;
        Ok(Self { worker })
    }

    /// Requests a cycle now.
    pub fn trigger(&self) -> Result<()> {
        self.worker.trigger()
    }

    /// Stops the worker thread.
    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }
}
