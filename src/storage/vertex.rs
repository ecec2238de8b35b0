use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::{EdgeTypeId, Gid, LabelId};

use super::entity::Entity;
use super::props::PropertyMap;

/// Adjacency entry stored on a vertex.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    /// Edge global id.
    pub edge: Gid,
    /// Vertex on the other end.
    pub vertex: Gid,
    /// Edge type.
    pub edge_type: EdgeTypeId,
}

/// Payload of one vertex version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Labels, unordered and unique.
    pub labels: SmallVec<[LabelId; 4]>,
    /// Properties.
    pub properties: PropertyMap,
    /// Outgoing edges.
    pub out_edges: Vec<EdgeRef>,
    /// Incoming edges.
    pub in_edges: Vec<EdgeRef>,
}

impl Vertex {
    /// Adds `label`, returning `false` when it was already present.
    pub fn add_label(&mut self, label: LabelId) -> bool {
        if self.has_label(label) {
            return false;
        }
        self.labels.push(label);
        true
    }

    /// Removes `label`, returning `false` when it was absent.
    pub fn remove_label(&mut self, label: LabelId) -> bool {
        match self.labels.iter().position(|l| *l == label) {
            Some(pos) => {
                self.labels.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns `true` when the vertex carries `label`.
    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }

    /// Returns `true` when any edge is attached.
    pub fn has_edges(&self) -> bool {
        !self.out_edges.is_empty() || !self.in_edges.is_empty()
    }

    pub(crate) fn remove_out_edge(&mut self, edge: Gid) {
        self.out_edges.retain(|e| e.edge != edge);
    }

    pub(crate) fn remove_in_edge(&mut self, edge: Gid) {
        self.in_edges.retain(|e| e.edge != edge);
    }
}

impl Entity for Vertex {
    fn labels(&self) -> &[LabelId] {
        &self.labels
    }

    fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.properties
    }
}
