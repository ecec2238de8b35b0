//! Transactional in-memory graph storage core.
//!
//! Vertices and edges are kept as version lists of immutable-once-superseded
//! records. Every transaction reads at a snapshot taken when it began, writes
//! new versions under short record locks, and sees its own writes per command.
//! Label, label/property and edge-type indexes hold possibly stale entries
//! that are filtered through visibility on every lookup and pruned by GC.
//!
//! ```no_run
//! use graphcore::{GraphDb, GraphDbOptions, PropertyValue, View};
//!
//! # fn main() -> graphcore::Result<()> {
//! let db = GraphDb::new(GraphDbOptions::default());
//! let dba = db.access();
//! let person = dba.label("Person");
//! let name = dba.property("name");
//! let v = dba.insert_vertex()?;
//! v.add_label(person)?;
//! v.props_set(name, PropertyValue::from("ada"))?;
//! drop(v);
//! dba.commit()?;
//!
//! let dba = db.access();
//! assert_eq!(dba.vertices_by_label(person, View::Old).len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod db;
pub mod distributed;
pub mod durability;
pub mod gc;
pub mod index;
pub mod mvcc;
pub mod primitives;
pub mod storage;
pub mod txn;
pub mod types;

pub use db::{
    CounterMetrics, DurabilityCfg, EdgeAccessor, GcCfg, GraphDb, GraphDbAccessor,
    GraphDbOptions, NoopMetrics, StorageMetrics, VertexAccessor,
};
pub use gc::GcStats;
pub use index::{IndexState, LabelPropertyKey};
pub use mvcc::View;
pub use storage::{PropertyMap, PropertyValue};
pub use txn::{Engine, Transaction};
pub use types::{CommandId, CommitSeq, EdgeTypeId, Gid, GraphError, LabelId, PropertyId, Result, TxId};
