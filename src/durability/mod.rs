//! Snapshot write-out and recovery.
//!
//! Snapshots are line-delimited JSON streams of [`SnapshotEntry`] values
//! captured at one transaction's view. Recovery replays them through the
//! same accessor operations live writes use.

mod recovery;
mod snapshot;

pub use recovery::{recover, RecoveryData};
pub use snapshot::{latest_snapshot, list_snapshots, make_snapshot, SnapshotEntry, SNAPSHOT_VERSION};
