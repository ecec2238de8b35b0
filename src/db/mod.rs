//! Database facade: options, the [`GraphDb`] handle, transactional accessors,
//! metrics, and background workers.

mod accessor;
mod graph_db;
mod metrics;
mod options;
mod worker;

pub use accessor::{EdgeAccessor, GraphDbAccessor, VertexAccessor};
pub use graph_db::GraphDb;
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, StorageMetrics};
pub use options::{DurabilityCfg, GcCfg, GraphDbOptions};
pub use worker::Worker;
