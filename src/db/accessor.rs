use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::index::{IndexPredicate, LabelPropertyKey, LabelPropertyValue};
use crate::mvcc::{Record, VersionList, View};
use crate::storage::{Edge, EdgeRef, PropertyMap, PropertyValue, Vertex};
use crate::txn::Transaction;
use crate::types::{CommandId, CommitSeq, EdgeTypeId, GraphError, Gid, LabelId, PropertyId, Result};

use super::graph_db::GraphDb;

/// A transaction bound to a database.
///
/// Dropping an accessor that was neither committed nor aborted aborts its
/// transaction.
pub struct GraphDbAccessor<'db> {
    db: &'db GraphDb,
    tx: Arc<Transaction>,
    ended: bool,
}

impl<'db> GraphDbAccessor<'db> {
    pub(crate) fn new(db: &'db GraphDb, tx: Arc<Transaction>) -> Self {
        Self {
            db,
            tx,
            ended: false,
        }
    }

    /// Database this accessor reads and writes.
    pub fn db(&self) -> &'db GraphDb {
        self.db
    }

    /// Underlying transaction.
    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.tx
    }

    /// Creates a vertex with a fresh gid.
    pub fn insert_vertex(&self) -> Result<VertexAccessor<'_>> {
        self.insert_vertex_with_gid(self.db.next_vertex_gid())
    }

    /// Creates a vertex with a caller-chosen gid.
    pub fn insert_vertex_with_gid(&self, gid: Gid) -> Result<VertexAccessor<'_>> {
        let (vlist, _) = VersionList::new(&self.tx, gid, Vertex::default());
        self.db.register_vertex(Arc::clone(&vlist))?;
        self.db.metrics().vertex_created();
        Ok(VertexAccessor::new(vlist, self, View::New))
    }

    /// Creates an edge `from -> to` with a fresh gid.
    pub fn insert_edge(
        &self,
        from: &VertexAccessor<'_>,
        to: &VertexAccessor<'_>,
        edge_type: EdgeTypeId,
    ) -> Result<EdgeAccessor<'_>> {
        self.insert_edge_with_gid(from, to, edge_type, self.db.next_edge_gid())
    }

    /// Creates an edge `from -> to` with a caller-chosen gid.
    pub fn insert_edge_with_gid(
        &self,
        from: &VertexAccessor<'_>,
        to: &VertexAccessor<'_>,
        edge_type: EdgeTypeId,
        gid: Gid,
    ) -> Result<EdgeAccessor<'_>> {
        if self.db.edge_vlist(gid).is_some() {
            return Err(GraphError::Invalid("edge gid already in use"));
        }
        let from_record = self.update(&from.vlist)?;
        from_record.data_mut().out_edges.push(EdgeRef {
            edge: gid,
            vertex: to.gid(),
            edge_type,
        });
        let to_record = self.update(&to.vlist)?;
        to_record.data_mut().in_edges.push(EdgeRef {
            edge: gid,
            vertex: from.gid(),
            edge_type,
        });

        let (vlist, record) = VersionList::new(&self.tx, gid, Edge::new(from.gid(), to.gid(), edge_type));
        self.db.register_edge(Arc::clone(&vlist))?;
        self.db.edge_type_index().update(edge_type, &vlist, &record);
        self.db.metrics().edge_created();
        Ok(EdgeAccessor::new(vlist, self, View::New))
    }

    /// Vertex `gid` if visible under `view`.
    pub fn find_vertex(&self, gid: Gid, view: View) -> Option<VertexAccessor<'_>> {
        let vlist = self.db.vertex_vlist(gid)?;
        vlist.find_view(&self.tx, view)?;
        Some(VertexAccessor::new(vlist, self, view))
    }

    /// Edge `gid` if visible under `view`.
    pub fn find_edge(&self, gid: Gid, view: View) -> Option<EdgeAccessor<'_>> {
        let vlist = self.db.edge_vlist(gid)?;
        vlist.find_view(&self.tx, view)?;
        Some(EdgeAccessor::new(vlist, self, view))
    }

    /// Every visible vertex.
    pub fn vertices(&self, view: View) -> Vec<VertexAccessor<'_>> {
        self.db
            .vertex_vlists()
            .into_iter()
            .filter(|vlist| vlist.find_view(&self.tx, view).is_some())
            .map(|vlist| VertexAccessor::new(vlist, self, view))
            .collect()
    }

    /// Visible vertices carrying `label`.
    pub fn vertices_by_label(&self, label: LabelId, view: View) -> Vec<VertexAccessor<'_>> {
        self.db
            .label_index()
            .get_vlists(label, &self.tx, view)
            .vlists()
            .map(|vlist| VertexAccessor::new(vlist, self, view))
            .collect()
    }

    /// Visible vertices carrying `label` with `property` set.
    ///
    /// Uses the label-property index when it is ready and scans otherwise.
    pub fn vertices_by_label_property(
        &self,
        label: LabelId,
        property: PropertyId,
        view: View,
    ) -> Vec<VertexAccessor<'_>> {
        let key = LabelPropertyKey::new(label, property);
        let index = self.db.label_property_index();
        if index.index_exists(key) {
            return index
                .get_vlists(key, &self.tx, view)
                .vlists()
                .map(|vlist| VertexAccessor::new(vlist, self, view))
                .collect();
        }
        self.scan_vertices(&key, view)
    }

    /// Visible vertices carrying `label` whose `property` equals `value`.
    pub fn vertices_by_label_property_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: PropertyValue,
        view: View,
    ) -> Vec<VertexAccessor<'_>> {
        let key = LabelPropertyKey::new(label, property);
        let index = self.db.label_property_index();
        if index.index_exists(key) {
            return index
                .get_vlists_with_value(key, value, &self.tx, view)
                .vlists()
                .map(|vlist| VertexAccessor::new(vlist, self, view))
                .collect();
        }
        self.scan_vertices(&LabelPropertyValue { key, value }, view)
    }

    /// Every visible edge.
    pub fn edges(&self, view: View) -> Vec<EdgeAccessor<'_>> {
        self.db
            .edge_vlists()
            .into_iter()
            .filter(|vlist| vlist.find_view(&self.tx, view).is_some())
            .map(|vlist| EdgeAccessor::new(vlist, self, view))
            .collect()
    }

    /// Visible edges of `edge_type`.
    pub fn edges_by_type(&self, edge_type: EdgeTypeId, view: View) -> Vec<EdgeAccessor<'_>> {
        self.db
            .edge_type_index()
            .get_vlists(edge_type, &self.tx, view)
            .vlists()
            .map(|vlist| EdgeAccessor::new(vlist, self, view))
            .collect()
    }

    /// Deletes a vertex that has no attached edges.
    pub fn remove_vertex(&self, vertex: &VertexAccessor<'_>) -> Result<()> {
        let record = vertex
            .vlist
            .find(&self.tx)
            .ok_or(GraphError::RecordDeleted)?;
        if record.data().has_edges() {
            return Err(GraphError::VertexHasEdges(vertex.gid()));
        }
        vertex.vlist.remove(&self.tx).map_err(|err| self.note(err))?;
        self.db.metrics().vertex_deleted();
        Ok(())
    }

    /// Deletes a vertex together with its edges.
    pub fn detach_remove_vertex(&self, vertex: &VertexAccessor<'_>) -> Result<()> {
        let record = vertex
            .vlist
            .find(&self.tx)
            .ok_or(GraphError::RecordDeleted)?;
        let mut edges: SmallVec<[Gid; 8]> = SmallVec::new();
        {
            let data = record.data();
            edges.extend(data.out_edges.iter().chain(data.in_edges.iter()).map(|e| e.edge));
        }
        edges.sort_unstable();
        edges.dedup();
        for gid in edges {
            if let Some(edge) = self.find_edge(gid, View::New) {
                self.remove_edge(&edge)?;
            }
        }
        self.remove_vertex(vertex)
    }

    /// Deletes an edge and unlinks it from both endpoints.
    pub fn remove_edge(&self, edge: &EdgeAccessor<'_>) -> Result<()> {
        let gid = edge.gid();
        let (from, to) = {
            let record = edge.vlist.find(&self.tx).ok_or(GraphError::RecordDeleted)?;
            let data = record.data();
            (data.from, data.to)
        };
        edge.vlist.remove(&self.tx).map_err(|err| self.note(err))?;
        let from_vlist = self
            .db
            .vertex_vlist(from)
            .ok_or(GraphError::NotFound("edge source vertex"))?;
        self.update(&from_vlist)?.data_mut().remove_out_edge(gid);
        let to_vlist = self
            .db
            .vertex_vlist(to)
            .ok_or(GraphError::NotFound("edge destination vertex"))?;
        self.update(&to_vlist)?.data_mut().remove_in_edge(gid);
        self.db.metrics().edge_deleted();
        Ok(())
    }

    /// Number of vertices visible at the current command.
    pub fn vertices_count(&self) -> usize {
        self.vertices(View::New).len()
    }

    /// Number of edges visible at the current command.
    pub fn edges_count(&self) -> usize {
        self.edges(View::New).len()
    }

    /// Interns a label name.
    pub fn label(&self, name: &str) -> LabelId {
        self.db.label(name)
    }

    /// Interns a property name.
    pub fn property(&self, name: &str) -> PropertyId {
        self.db.property(name)
    }

    /// Interns an edge-type name.
    pub fn edge_type(&self, name: &str) -> EdgeTypeId {
        self.db.edge_type(name)
    }

    /// Name of `label`.
    pub fn label_name(&self, label: LabelId) -> Option<String> {
        self.db.label_names().id_to_value(label.0)
    }

    /// Name of `property`.
    pub fn property_name(&self, property: PropertyId) -> Option<String> {
        self.db.property_names().id_to_value(property.0)
    }

    /// Name of `edge_type`.
    pub fn edge_type_name(&self, edge_type: EdgeTypeId) -> Option<String> {
        self.db.edge_type_names().id_to_value(edge_type.0)
    }

    /// Starts the next command so later reads see this command's writes in
    /// the old view as well.
    pub fn advance_command(&self) -> Result<CommandId> {
        let cid = self.db.engine().advance(self.tx.id())?;
        self.db
            .remote_data()
            .clear_cache_for_single_transaction(self.tx.id());
        Ok(cid)
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> Result<CommitSeq> {
        self.ended = true;
        self.db.remote_data().clear_cache_for_single_transaction(self.tx.id());
        self.db.engine().commit(&self.tx).map_err(|err| self.note(err))
    }

    /// Aborts the transaction.
    pub fn abort(mut self) -> Result<()> {
        self.ended = true;
        self.db.remote_data().clear_cache_for_single_transaction(self.tx.id());
        self.db.engine().abort(&self.tx)
    }

    fn scan_vertices<P: IndexPredicate<Vertex>>(&self, predicate: &P, view: View) -> Vec<VertexAccessor<'_>> {
        self.db
            .vertex_vlists()
            .into_iter()
            .filter(|vlist| {
                vlist
                    .find_view(&self.tx, view)
                    .is_some_and(|record| predicate.matches(&*record.data()))
            })
            .map(|vlist| VertexAccessor::new(vlist, self, view))
            .collect()
    }

    fn update<T: Clone>(&self, vlist: &Arc<VersionList<T>>) -> Result<Arc<Record<T>>> {
        vlist.update(&self.tx).map_err(|err| self.note(err))
    }

    fn note(&self, err: GraphError) -> GraphError {
        match &err {
            GraphError::Serialization { .. } => self.db.metrics().serialization_conflict(),
            GraphError::LockTimeout { .. } => self.db.metrics().lock_timeout(),
            _ => {}
        }
        err
    }
}

impl Drop for GraphDbAccessor<'_> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        self.db.remote_data().clear_cache_for_single_transaction(self.tx.id());
        if let Err(err) = self.db.engine().abort(&self.tx) {
            debug!(tx = self.tx.id(), error = %err, "db.accessor.abort_on_drop");
        }
    }
}

/// Handle on one vertex within a transaction.
pub struct VertexAccessor<'a> {
    vlist: Arc<VersionList<Vertex>>,
    dba: &'a GraphDbAccessor<'a>,
    view: View,
}

impl<'a> VertexAccessor<'a> {
    fn new(vlist: Arc<VersionList<Vertex>>, dba: &'a GraphDbAccessor<'a>, view: View) -> Self {
        Self { vlist, dba, view }
    }

    /// Global id.
    pub fn gid(&self) -> Gid {
        self.vlist.gid()
    }

    /// Version list behind this accessor.
    pub fn vlist(&self) -> &Arc<VersionList<Vertex>> {
        &self.vlist
    }

    /// View used for reads.
    pub fn view(&self) -> View {
        self.view
    }

    /// Reads subsequent data as of the previous command.
    pub fn switch_old(&mut self) {
        self.view = View::Old;
    }

    /// Reads subsequent data including the current command's writes.
    pub fn switch_new(&mut self) {
        self.view = View::New;
    }

    /// Adds `label`; returns `false` when already present.
    pub fn add_label(&self, label: LabelId) -> Result<bool> {
        let record = self.dba.update(&self.vlist)?;
        let added = record.data_mut().add_label(label);
        if added {
            let db = self.dba.db;
            db.label_index().update(label, &self.vlist, &record);
            db.label_property_index()
                .update_on_label(label, &self.vlist, &record);
        }
        Ok(added)
    }

    /// Removes `label`; returns `false` when absent.
    pub fn remove_label(&self, label: LabelId) -> Result<bool> {
        let latest = self
            .vlist
            .find_view(&self.dba.tx, View::New)
            .ok_or(GraphError::RecordDeleted)?;
        if !latest.data().has_label(label) {
            return Ok(false);
        }
        let record = self.dba.update(&self.vlist)?;
        let removed = record.data_mut().remove_label(label);
        Ok(removed)
    }

    /// Returns `true` when the vertex carries `label`.
    pub fn has_label(&self, label: LabelId) -> Result<bool> {
        Ok(self.current()?.data().has_label(label))
    }

    /// Labels of the vertex.
    pub fn labels(&self) -> Result<Vec<LabelId>> {
        Ok(self.current()?.data().labels.to_vec())
    }

    /// Value of `property`, or `Null`.
    pub fn props_at(&self, property: PropertyId) -> Result<PropertyValue> {
        Ok(self.current()?.data().properties.at(property).clone())
    }

    /// Sets `property`; `Null` erases it.
    pub fn props_set(&self, property: PropertyId, value: PropertyValue) -> Result<()> {
        let record = self.dba.update(&self.vlist)?;
        record.data_mut().properties.set(property, value);
        self.dba
            .db
            .label_property_index()
            .update_on_property(property, &self.vlist, &record);
        Ok(())
    }

    /// Erases `property`; returns whether it was set.
    pub fn props_erase(&self, property: PropertyId) -> Result<bool> {
        let record = self.dba.update(&self.vlist)?;
        let erased = record.data_mut().properties.erase(property);
        Ok(erased)
    }

    /// All properties.
    pub fn properties(&self) -> Result<PropertyMap> {
        Ok(self.current()?.data().properties.clone())
    }

    /// Outgoing adjacency.
    pub fn out_edges(&self) -> Result<Vec<EdgeRef>> {
        Ok(self.current()?.data().out_edges.clone())
    }

    /// Incoming adjacency.
    pub fn in_edges(&self) -> Result<Vec<EdgeRef>> {
        Ok(self.current()?.data().in_edges.clone())
    }

    /// Number of outgoing edges.
    pub fn out_degree(&self) -> Result<usize> {
        Ok(self.current()?.data().out_edges.len())
    }

    /// Number of incoming edges.
    pub fn in_degree(&self) -> Result<usize> {
        Ok(self.current()?.data().in_edges.len())
    }

    fn current(&self) -> Result<Arc<Record<Vertex>>> {
        self.vlist
            .find_view(&self.dba.tx, self.view)
            .ok_or(GraphError::RecordDeleted)
    }
}

impl std::fmt::Debug for VertexAccessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexAccessor")
            .field("gid", &self.gid())
            .field("view", &self.view)
            .finish()
    }
}

/// Handle on one edge within a transaction.
pub struct EdgeAccessor<'a> {
    vlist: Arc<VersionList<Edge>>,
    dba: &'a GraphDbAccessor<'a>,
    view: View,
}

impl<'a> EdgeAccessor<'a> {
    fn new(vlist: Arc<VersionList<Edge>>, dba: &'a GraphDbAccessor<'a>, view: View) -> Self {
        Self { vlist, dba, view }
    }

    /// Global id.
    pub fn gid(&self) -> Gid {
        self.vlist.gid()
    }

    /// Version list behind this accessor.
    pub fn vlist(&self) -> &Arc<VersionList<Edge>> {
        &self.vlist
    }

    /// View used for reads.
    pub fn view(&self) -> View {
        self.view
    }

    /// Source vertex gid.
    pub fn from(&self) -> Result<Gid> {
        Ok(self.current()?.data().from)
    }

    /// Destination vertex gid.
    pub fn to(&self) -> Result<Gid> {
        Ok(self.current()?.data().to)
    }

    /// Edge type.
    pub fn edge_type(&self) -> Result<EdgeTypeId> {
        Ok(self.current()?.data().edge_type)
    }

    /// Source vertex, if visible.
    pub fn from_vertex(&self) -> Result<Option<VertexAccessor<'a>>> {
        let gid = self.from()?;
        Ok(self.dba.find_vertex(gid, self.view))
    }

    /// Destination vertex, if visible.
    pub fn to_vertex(&self) -> Result<Option<VertexAccessor<'a>>> {
        let gid = self.to()?;
        Ok(self.dba.find_vertex(gid, self.view))
    }

    /// Value of `property`, or `Null`.
    pub fn props_at(&self, property: PropertyId) -> Result<PropertyValue> {
        Ok(self.current()?.data().properties.at(property).clone())
    }

    /// Sets `property`; `Null` erases it.
    pub fn props_set(&self, property: PropertyId, value: PropertyValue) -> Result<()> {
        let record = self.dba.update(&self.vlist)?;
        record.data_mut().properties.set(property, value);
        Ok(())
    }

    /// Erases `property`; returns whether it was set.
    pub fn props_erase(&self, property: PropertyId) -> Result<bool> {
        let record = self.dba.update(&self.vlist)?;
        let erased = record.data_mut().properties.erase(property);
        Ok(erased)
    }

    /// All properties.
    pub fn properties(&self) -> Result<PropertyMap> {
        Ok(self.current()?.data().properties.clone())
    }

    fn current(&self) -> Result<Arc<Record<Edge>>> {
        self.vlist
            .find_view(&self.dba.tx, self.view)
            .ok_or(GraphError::RecordDeleted)
    }
}

impl std::fmt::Debug for EdgeAccessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeAccessor")
            .field("gid", &self.gid())
            .field("view", &self.view)
            .finish()
    }
}
