use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::distributed::RemoteDataManager;
use crate::durability;
use crate::gc::{GarbageCollector, GcStats, GcWorker};
use crate::index::{EdgeTypeIndex, LabelIndex, LabelPropertyIndex, LabelPropertyKey};
use crate::mvcc::{VersionList, View};
use crate::storage::{Edge, NameIdMapper, Vertex};
use crate::txn::Engine;
use crate::types::{EdgeTypeId, GraphError, Gid, LabelId, PropertyId, Result};

use super::accessor::GraphDbAccessor;
use super::metrics::{default_metrics, StorageMetrics};
use super::options::GraphDbOptions;
use super::worker::Worker;

type VlistMap<T> = RwLock<FxHashMap<Gid, Arc<VersionList<T>>>>;

/// In-memory transactional graph database.
///
/// Owns the transaction engine, the vertex and edge version lists, name
/// interning and the three secondary indexes. All reads and writes go through
/// a [`GraphDbAccessor`] opened with [`GraphDb::access`].
pub struct GraphDb {
    engine: Engine,
    vertices: VlistMap<Vertex>,
    edges: VlistMap<Edge>,
    next_vertex_gid: AtomicU64,
    next_edge_gid: AtomicU64,
    labels: NameIdMapper,
    properties: NameIdMapper,
    edge_types: NameIdMapper,
    label_index: LabelIndex<Vertex>,
    label_property_index: LabelPropertyIndex<Vertex>,
    edge_type_index: EdgeTypeIndex,
    remote_data: Arc<RemoteDataManager>,
    metrics: Arc<dyn StorageMetrics>,
    options: GraphDbOptions,
    last_gc: Mutex<Option<GcStats>>,
    gc_worker: Mutex<Option<GcWorker>>,
    snapshot_worker: Mutex<Option<Worker>>,
}

impl GraphDb {
    /// Creates a database without background workers or recovery.
    pub fn new(options: GraphDbOptions) -> Self {
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        Self {
            engine: Engine::new(options.lock_timeout),
            vertices: RwLock::new(FxHashMap::default()),
            edges: RwLock::new(FxHashMap::default()),
            next_vertex_gid: AtomicU64::new(0),
            next_edge_gid: AtomicU64::new(0),
            labels: NameIdMapper::new(),
            properties: NameIdMapper::new(),
            edge_types: NameIdMapper::new(),
            label_index: LabelIndex::new(),
            label_property_index: LabelPropertyIndex::new(),
            edge_type_index: EdgeTypeIndex::new(),
            remote_data: Arc::new(RemoteDataManager::new()),
            metrics,
            options,
            last_gc: Mutex::new(None),
            gc_worker: Mutex::new(None),
            snapshot_worker: Mutex::new(None),
        }
    }

    /// Opens a database, recovering from the newest snapshot and starting
    /// background workers as configured.
    pub fn open(options: GraphDbOptions) -> Result<Arc<Self>> {
        let db = Arc::new(Self::new(options));
        let durability = db.options.durability.clone();
        if durability.recover_on_startup {
            match durability::latest_snapshot(&durability.directory)? {
                Some(path) => {
                    let recovered = durability::recover(&db, &path)?;
                    info!(
                        path = %path.display(),
                        vertices = recovered.vertices,
                        edges = recovered.edges,
                        "db.recovered"
                    );
                }
                None => debug!(dir = %durability.directory.display(), "db.recover.no_snapshot"),
            }
        }
        if db.options.gc.enabled {
            let worker = GcWorker::spawn(&db, db.options.gc.interval)?;
            *db.gc_worker.lock() = Some(worker);
        }
        if durability.enabled {
            let max_retained = durability.snapshot_max_retained;
            let dir = durability.directory.clone();
            let worker = Worker::spawn(
                "graphcore-snapshot",
                durability.snapshot_cycle,
                Arc::downgrade(&db),
                move |db| {
                    if let Err(err) = durability::make_snapshot(db, &dir, max_retained) {
                        warn!(error = %err, "durability.snapshot.failed");
                    }
                },
            )?;
            *db.snapshot_worker.lock() = Some(worker);
        }
        Ok(db)
    }

    /// Opens an accessor bound to a new transaction.
    pub fn access(&self) -> GraphDbAccessor<'_> {
        GraphDbAccessor::new(self, self.engine.begin())
    }

    /// Transaction engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Options the database was created with.
    pub fn options(&self) -> &GraphDbOptions {
        &self.options
    }

    /// Metrics sink.
    pub fn metrics(&self) -> &Arc<dyn StorageMetrics> {
        &self.metrics
    }

    /// Label index over vertices.
    pub fn label_index(&self) -> &LabelIndex<Vertex> {
        &self.label_index
    }

    /// Label-property index over vertices.
    pub fn label_property_index(&self) -> &LabelPropertyIndex<Vertex> {
        &self.label_property_index
    }

    /// Edge-type index.
    pub fn edge_type_index(&self) -> &EdgeTypeIndex {
        &self.edge_type_index
    }

    /// Per-transaction cache of records fetched from other workers.
    pub fn remote_data(&self) -> &Arc<RemoteDataManager> {
        &self.remote_data
    }

    /// Interns a label name.
    pub fn label(&self, name: &str) -> LabelId {
        LabelId(self.labels.value_to_id(name))
    }

    /// Interns a property name.
    pub fn property(&self, name: &str) -> PropertyId {
        PropertyId(self.properties.value_to_id(name))
    }

    /// Interns an edge-type name.
    pub fn edge_type(&self, name: &str) -> EdgeTypeId {
        EdgeTypeId(self.edge_types.value_to_id(name))
    }

    /// Label name mapper.
    pub fn label_names(&self) -> &NameIdMapper {
        &self.labels
    }

    /// Property name mapper.
    pub fn property_names(&self) -> &NameIdMapper {
        &self.properties
    }

    /// Edge-type name mapper.
    pub fn edge_type_names(&self) -> &NameIdMapper {
        &self.edge_types
    }

    /// Version list of vertex `gid`, visible or not.
    pub fn vertex_vlist(&self, gid: Gid) -> Option<Arc<VersionList<Vertex>>> {
        self.vertices.read().get(&gid).cloned()
    }

    /// Version list of edge `gid`, visible or not.
    pub fn edge_vlist(&self, gid: Gid) -> Option<Arc<VersionList<Edge>>> {
        self.edges.read().get(&gid).cloned()
    }

    /// All vertex version lists in gid order.
    pub fn vertex_vlists(&self) -> Vec<Arc<VersionList<Vertex>>> {
        sorted_vlists(&self.vertices)
    }

    /// All edge version lists in gid order.
    pub fn edge_vlists(&self) -> Vec<Arc<VersionList<Edge>>> {
        sorted_vlists(&self.edges)
    }

    /// Builds the label-property index for `(label, property)`.
    ///
    /// Waits for every transaction active at creation time to finish, then
    /// scans the vertices visible to a fresh transaction. Must not be called
    /// while the calling thread holds an open accessor.
    pub fn build_index(&self, label: LabelId, property: PropertyId) -> Result<()> {
        let key = LabelPropertyKey::new(label, property);
        if !self.label_property_index.create_index(key) {
            return Err(GraphError::IndexExists);
        }
        let wait_for = self.engine.global_active();
        for id in wait_for.iter() {
            while self.engine.is_active(id) {
                thread::sleep(Duration::from_millis(1));
            }
        }
        let dba = self.access();
        let mut scanned = 0usize;
        for (vlist, record) in self
            .label_index
            .get_vlists(label, dba.transaction(), View::New)
            .iter()
        {
            self.label_property_index
                .update_on_label_property(&vlist, &record);
            scanned += 1;
        }
        dba.commit()?;
        self.label_property_index.index_finished_building(key);
        info!(label = label.0, property = property.0, scanned, "db.index.built");
        Ok(())
    }

    /// Runs one garbage collection cycle now.
    pub fn collect_garbage(&self) -> GcStats {
        let stats = GarbageCollector::collect(self);
        *self.last_gc.lock() = Some(stats.clone());
        stats
    }

    /// Statistics of the most recent garbage collection cycle.
    pub fn last_gc_stats(&self) -> Option<GcStats> {
        self.last_gc.lock().clone()
    }

    /// Asks the background collector to run a cycle now.
    pub fn trigger_gc(&self) -> Result<()> {
        match self.gc_worker.lock().as_ref() {
            Some(worker) => worker.trigger(),
            None => Err(GraphError::Invalid("garbage collection worker is disabled")),
        }
    }

    /// Writes a snapshot into the configured durability directory.
    pub fn make_snapshot(&self) -> Result<PathBuf> {
        let cfg = &self.options.durability;
        durability::make_snapshot(self, &cfg.directory, cfg.snapshot_max_retained)
    }

    /// Next vertex and edge gids the generators will hand out.
    pub fn gid_generators(&self) -> (Gid, Gid) {
        (
            Gid(self.next_vertex_gid.load(Ordering::Acquire)),
            Gid(self.next_edge_gid.load(Ordering::Acquire)),
        )
    }

    /// Raises the gid generators so neither hands out an id below the given ones.
    pub fn ensure_gid_generators(&self, vertex: Gid, edge: Gid) {
        self.next_vertex_gid.fetch_max(vertex.0, Ordering::AcqRel);
        self.next_edge_gid.fetch_max(edge.0, Ordering::AcqRel);
    }

    pub(crate) fn next_vertex_gid(&self) -> Gid {
        Gid(self.next_vertex_gid.fetch_add(1, Ordering::AcqRel))
    }

    pub(crate) fn next_edge_gid(&self) -> Gid {
        Gid(self.next_edge_gid.fetch_add(1, Ordering::AcqRel))
    }

    pub(crate) fn register_vertex(&self, vlist: Arc<VersionList<Vertex>>) -> Result<()> {
        let gid = vlist.gid();
        let mut vertices = self.vertices.write();
        if vertices.contains_key(&gid) {
            return Err(GraphError::Invalid("vertex gid already in use"));
        }
        vertices.insert(gid, vlist);
        self.next_vertex_gid.fetch_max(gid.0 + 1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn register_edge(&self, vlist: Arc<VersionList<Edge>>) -> Result<()> {
        let gid = vlist.gid();
        let mut edges = self.edges.write();
        if edges.contains_key(&gid) {
            return Err(GraphError::Invalid("edge gid already in use"));
        }
        edges.insert(gid, vlist);
        self.next_edge_gid.fetch_max(gid.0 + 1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn vertex_map(&self) -> &VlistMap<Vertex> {
        &self.vertices
    }

    pub(crate) fn edge_map(&self) -> &VlistMap<Edge> {
        &self.edges
    }
}

fn sorted_vlists<T>(map: &VlistMap<T>) -> Vec<Arc<VersionList<T>>> {
    let mut vlists: Vec<Arc<VersionList<T>>> = map.read().values().cloned().collect();
    vlists.sort_unstable_by_key(|v| v.gid());
    vlists
}

impl Drop for GraphDb {
    fn drop(&mut self) {
        if let Some(mut worker) = self.gc_worker.lock().take() {
            worker.shutdown();
        }
        if let Some(mut worker) = self.snapshot_worker.lock().take() {
            worker.shutdown();
        }
        let cfg = &self.options.durability;
        if cfg.snapshot_on_exit {
            if let Err(err) = durability::make_snapshot(self, &cfg.directory, cfg.snapshot_max_retained) {
                warn!(error = %err, "durability.snapshot_on_exit.failed");
            }
        }
    }
}

impl std::fmt::Debug for GraphDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDb")
            .field("vertices", &self.vertices.read().len())
            .field("edges", &self.edges.read().len())
            .field("active_transactions", &self.engine.active_count())
            .finish()
    }
}
