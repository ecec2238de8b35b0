use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking storage events in the graph database.
///
/// Implementations collect counts of entity creation and deletion, write
/// conflicts, and garbage collection progress for monitoring.
pub trait StorageMetrics: Send + Sync {
    /// Records the creation of a vertex.
    fn vertex_created(&self);

    /// Records the deletion of a vertex.
    fn vertex_deleted(&self);

    /// Records the creation of an edge.
    fn edge_created(&self);

    /// Records the deletion of an edge.
    fn edge_deleted(&self);

    /// Records a write that lost a write-write conflict.
    fn serialization_conflict(&self);

    /// Records a write-intent wait that hit its deadline.
    fn lock_timeout(&self);

    /// Records a finished garbage collection cycle.
    ///
    /// # Parameters
    /// * `records` - Versions reclaimed during the cycle.
    /// * `index_entries` - Index entries pruned during the cycle.
    fn gc_cycle(&self, records: u64, index_entries: u64);
}

/// A no-op implementation of [`StorageMetrics`] that discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl StorageMetrics for NoopMetrics {
    fn vertex_created(&self) {}
    fn vertex_deleted(&self) {}
    fn edge_created(&self) {}
    fn edge_deleted(&self) {}
    fn serialization_conflict(&self) {}
    fn lock_timeout(&self) {}
    fn gc_cycle(&self, _records: u64, _index_entries: u64) {}
}

/// A thread-safe counter-based implementation of [`StorageMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Number of vertices created.
    pub vertices_created: AtomicU64,

    /// Number of vertices deleted.
    pub vertices_deleted: AtomicU64,

    /// Number of edges created.
    pub edges_created: AtomicU64,

    /// Number of edges deleted.
    pub edges_deleted: AtomicU64,

    /// Number of serialization conflicts.
    pub serialization_conflicts: AtomicU64,

    /// Number of lock timeouts.
    pub lock_timeouts: AtomicU64,

    /// Number of garbage collection cycles.
    pub gc_cycles: AtomicU64,

    /// Versions reclaimed across all cycles.
    pub gc_records_reclaimed: AtomicU64,

    /// Index entries pruned across all cycles.
    pub gc_index_entries_removed: AtomicU64,
}

impl StorageMetrics for CounterMetrics {
    fn vertex_created(&self) {
        self.vertices_created.fetch_add(1, Ordering::Relaxed);
    }

    fn vertex_deleted(&self) {
        self.vertices_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_created(&self) {
        self.edges_created.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_deleted(&self) {
        self.edges_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn serialization_conflict(&self) {
        self.serialization_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    fn lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn gc_cycle(&self, records: u64, index_entries: u64) {
        self.gc_cycles.fetch_add(1, Ordering::Relaxed);
        self.gc_records_reclaimed.fetch_add(records, Ordering::Relaxed);
        self.gc_index_entries_removed
            .fetch_add(index_entries, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation, [`NoopMetrics`], in an [`Arc`].
pub fn default_metrics() -> Arc<dyn StorageMetrics> {
    Arc::new(NoopMetrics)
}
