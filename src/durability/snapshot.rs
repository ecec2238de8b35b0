use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::GraphDb;
use crate::storage::PropertyMap;
use crate::types::{EdgeTypeId, Gid, LabelId, PropertyId, Result, TxId};

/// Snapshot format version written into the header.
pub const SNAPSHOT_VERSION: u32 = 1;

const SNAPSHOT_PREFIX: &str = "snapshot_";
const SNAPSHOT_EXT: &str = "jsonl";

/// One line of a snapshot file.
///
/// A snapshot is a header, then vertices, edges and index keys, then a footer
/// with the entity counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotEntry {
    /// Leading entry with the name tables the ids below refer to.
    Header {
        /// Format version.
        version: u32,
        /// Transaction the snapshot was taken in.
        tx_id: TxId,
        /// Label names by id.
        labels: Vec<String>,
        /// Property names by id.
        properties: Vec<String>,
        /// Edge-type names by id.
        edge_types: Vec<String>,
        /// Next vertex gid to hand out.
        #[serde(default)]
        next_vertex_gid: u64,
        /// Next edge gid to hand out.
        #[serde(default)]
        next_edge_gid: u64,
    },
    /// A visible vertex without adjacency.
    Vertex {
        /// Global id.
        gid: Gid,
        /// Labels.
        labels: Vec<LabelId>,
        /// Properties.
        properties: PropertyMap,
    },
    /// A visible edge.
    Edge {
        /// Global id.
        gid: Gid,
        /// Source vertex.
        from: Gid,
        /// Destination vertex.
        to: Gid,
        /// Edge type.
        edge_type: EdgeTypeId,
        /// Properties.
        properties: PropertyMap,
    },
    /// A ready label-property index.
    Index {
        /// Indexed label.
        label: LabelId,
        /// Indexed property.
        property: PropertyId,
    },
    /// Trailing entry; its counts must match the entries above.
    Footer {
        /// Vertex entries written.
        vertices: u64,
        /// Edge entries written.
        edges: u64,
    },
}

/// Writes a snapshot of every entity visible to a fresh transaction into `dir`.
///
/// Keeps at most `max_retained` snapshot files when it is positive. Returns
/// the path of the new file.
pub fn make_snapshot(db: &GraphDb, dir: &Path, max_retained: i64) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let dba = db.access();
    let tx = dba.transaction();
    let path = dir.join(format!(
        "{SNAPSHOT_PREFIX}{:016}_{:010}.{SNAPSHOT_EXT}",
        unix_millis(),
        tx.id()
    ));
    let tmp = path.with_extension("tmp");
    let (next_vertex_gid, next_edge_gid) = db.gid_generators();

    let mut out = BufWriter::new(File::create(&tmp)?);
    write_entry(
        &mut out,
        &SnapshotEntry::Header {
            version: SNAPSHOT_VERSION,
            tx_id: tx.id(),
            labels: db.label_names().names(),
            properties: db.property_names().names(),
            edge_types: db.edge_type_names().names(),
            next_vertex_gid: next_vertex_gid.0,
            next_edge_gid: next_edge_gid.0,
        },
    )?;

    let mut vertices = 0u64;
    for vlist in db.vertex_vlists() {
        let Some(record) = vlist.find(tx) else {
            continue;
        };
        let entry = {
            let data = record.data();
            SnapshotEntry::Vertex {
                gid: vlist.gid(),
                labels: data.labels.to_vec(),
                properties: data.properties.clone(),
            }
        };
        write_entry(&mut out, &entry)?;
        vertices += 1;
    }

    let mut edges = 0u64;
    for vlist in db.edge_vlists() {
        let Some(record) = vlist.find(tx) else {
            continue;
        };
        let entry = {
            let data = record.data();
            SnapshotEntry::Edge {
                gid: vlist.gid(),
                from: data.from,
                to: data.to,
                edge_type: data.edge_type,
                properties: data.properties.clone(),
            }
        };
        write_entry(&mut out, &entry)?;
        edges += 1;
    }

    for key in db.label_property_index().keys() {
        write_entry(
            &mut out,
            &SnapshotEntry::Index {
                label: key.label,
                property: key.property,
            },
        )?;
    }
    write_entry(&mut out, &SnapshotEntry::Footer { vertices, edges })?;

    let file = out.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    drop(file);
    dba.commit()?;
    fs::rename(&tmp, &path)?;

    info!(path = %path.display(), vertices, edges, "durability.snapshot.created");
    if max_retained > 0 {
        rotate(dir, max_retained as usize)?;
    }
    Ok(path)
}

/// Newest snapshot file in `dir`, if any.
pub fn latest_snapshot(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(list_snapshots(dir)?.pop())
}

/// Snapshot files in `dir`, oldest first.
pub fn list_snapshots(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_snapshot = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(SNAPSHOT_PREFIX))
            && path.extension().is_some_and(|e| e == SNAPSHOT_EXT);
        if is_snapshot {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn rotate(dir: &Path, keep: usize) -> Result<()> {
    let files = list_snapshots(dir)?;
    if files.len() <= keep {
        return Ok(());
    }
    let excess = files.len() - keep;
    for path in &files[..excess] {
        fs::remove_file(path)?;
        debug!(path = %path.display(), "durability.snapshot.rotated");
    }
    Ok(())
}

fn write_entry<W: Write>(out: &mut W, entry: &SnapshotEntry) -> Result<()> {
    serde_json::to_writer(&mut *out, entry)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
