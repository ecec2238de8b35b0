use serde::{Deserialize, Serialize};

use crate::types::{EdgeTypeId, Gid, LabelId};

use super::entity::Entity;
use super::props::PropertyMap;

/// Payload of one edge version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source vertex.
    pub from: Gid,
    /// Destination vertex.
    pub to: Gid,
    /// Edge type.
    pub edge_type: EdgeTypeId,
    /// Properties.
    pub properties: PropertyMap,
}

impl Edge {
    /// Creates an edge without properties.
    pub fn new(from: Gid, to: Gid, edge_type: EdgeTypeId) -> Self {
        Self {
            from,
            to,
            edge_type,
            properties: PropertyMap::new(),
        }
    }
}

impl Entity for Edge {
    fn labels(&self) -> &[LabelId] {
        &[]
    }

    fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.properties
    }
}
