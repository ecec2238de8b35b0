use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::db::GraphDb;
use crate::index::LabelPropertyKey;
use crate::mvcc::View;
use crate::types::{EdgeTypeId, Gid, GraphError, LabelId, PropertyId, Result, TxId};

use super::snapshot::{SnapshotEntry, SNAPSHOT_VERSION};

/// Summary of a completed recovery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryData {
    /// Transaction the snapshot was taken in.
    pub snapshot_tx_id: TxId,
    /// Vertices restored.
    pub vertices: usize,
    /// Edges restored.
    pub edges: usize,
    /// Label-property indexes rebuilt.
    pub indexes: Vec<LabelPropertyKey>,
}

struct NameRemap {
    labels: Vec<LabelId>,
    properties: Vec<PropertyId>,
    edge_types: Vec<EdgeTypeId>,
}

impl NameRemap {
    fn label(&self, id: LabelId) -> Result<LabelId> {
        self.labels
            .get(id.0 as usize)
            .copied()
            .ok_or(GraphError::Corruption("snapshot label id out of range"))
    }

    fn property(&self, id: PropertyId) -> Result<PropertyId> {
        self.properties
            .get(id.0 as usize)
            .copied()
            .ok_or(GraphError::Corruption("snapshot property id out of range"))
    }

    fn edge_type(&self, id: EdgeTypeId) -> Result<EdgeTypeId> {
        self.edge_types
            .get(id.0 as usize)
            .copied()
            .ok_or(GraphError::Corruption("snapshot edge type id out of range"))
    }
}

/// Replays the snapshot at `path` into `db`.
///
/// Entities are inserted with their original gids through the regular
/// accessor path in one transaction. Recorded indexes are then rebuilt and
/// every index is refreshed.
pub fn recover(db: &GraphDb, path: &Path) -> Result<RecoveryData> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    let header = match lines.next() {
        Some(line) => serde_json::from_str::<SnapshotEntry>(&line?)?,
        None => return Err(GraphError::Corruption("snapshot is empty")),
    };
    let SnapshotEntry::Header {
        version,
        tx_id,
        labels,
        properties,
        edge_types,
        next_vertex_gid,
        next_edge_gid,
    } = header
    else {
        return Err(GraphError::Corruption("snapshot header missing"));
    };
    if version != SNAPSHOT_VERSION {
        return Err(GraphError::Corruption("unsupported snapshot version"));
    }
    let remap = NameRemap {
        labels: labels.iter().map(|n| db.label(n)).collect(),
        properties: properties.iter().map(|n| db.property(n)).collect(),
        edge_types: edge_types.iter().map(|n| db.edge_type(n)).collect(),
    };

    let mut data = RecoveryData {
        snapshot_tx_id: tx_id,
        ..RecoveryData::default()
    };
    let mut saw_footer = false;
    let dba = db.access();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if saw_footer {
            return Err(GraphError::Corruption("entries after snapshot footer"));
        }
        match serde_json::from_str::<SnapshotEntry>(&line)? {
            SnapshotEntry::Header { .. } => {
                return Err(GraphError::Corruption("duplicate snapshot header"));
            }
            SnapshotEntry::Vertex {
                gid,
                labels,
                properties,
            } => {
                let vertex = dba.insert_vertex_with_gid(gid)?;
                for label in labels {
                    vertex.add_label(remap.label(label)?)?;
                }
                for (property, value) in properties.iter() {
                    vertex.props_set(remap.property(property)?, value.clone())?;
                }
                data.vertices += 1;
            }
            SnapshotEntry::Edge {
                gid,
                from,
                to,
                edge_type,
                properties,
            } => {
                let from = dba
                    .find_vertex(from, View::New)
                    .ok_or(GraphError::Corruption("edge source vertex missing"))?;
                let to = dba
                    .find_vertex(to, View::New)
                    .ok_or(GraphError::Corruption("edge destination vertex missing"))?;
                let edge = dba.insert_edge_with_gid(&from, &to, remap.edge_type(edge_type)?, gid)?;
                for (property, value) in properties.iter() {
                    edge.props_set(remap.property(property)?, value.clone())?;
                }
                data.edges += 1;
            }
            SnapshotEntry::Index { label, property } => {
                data.indexes.push(LabelPropertyKey::new(
                    remap.label(label)?,
                    remap.property(property)?,
                ));
            }
            SnapshotEntry::Footer { vertices, edges } => {
                if vertices != data.vertices as u64 || edges != data.edges as u64 {
                    return Err(GraphError::Corruption("snapshot footer count mismatch"));
                }
                saw_footer = true;
            }
        }
    }
    if !saw_footer {
        return Err(GraphError::Corruption("snapshot truncated"));
    }
    dba.commit()?;
    db.engine().ensure_next_id_greater(tx_id);
    db.ensure_gid_generators(Gid(next_vertex_gid), Gid(next_edge_gid));

    for key in &data.indexes {
        match db.build_index(key.label, key.property) {
            Ok(()) | Err(GraphError::IndexExists) => {}
            Err(err) => return Err(err),
        }
    }
    let watermark = db.engine().gc_watermark();
    let clog = db.engine().commit_log();
    db.label_index().refresh(&watermark, clog);
    db.label_property_index().refresh(&watermark, clog);
    db.edge_type_index().refresh(&watermark, clog);

    info!(
        path = %path.display(),
        tx_id,
        vertices = data.vertices,
        edges = data.edges,
        indexes = data.indexes.len(),
        "durability.recovery.completed"
    );
    Ok(data)
}
