//! Transaction engine: id allocation, snapshots, the commit log and the
//! reclamation watermark.

mod commit_log;
mod engine;
mod snapshot;
mod transaction;

pub use commit_log::{CommitLog, TxStatus};
pub use engine::{Engine, Watermark};
pub use snapshot::Snapshot;
pub use transaction::Transaction;
