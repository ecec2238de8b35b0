use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::primitives::concurrency::{LockStore, RecordLock};
use crate::types::{CommandId, Result, TxId};

use super::commit_log::{CommitLog, TxStatus};
use super::snapshot::Snapshot;

/// A running transaction.
///
/// Created by [`Engine::begin`](super::Engine::begin) and shared as an
/// `Arc<Transaction>`; the engine keeps it in the active set until commit or
/// abort. Write intents taken through [`Transaction::take_lock`] are held until
/// the transaction ends.
#[derive(Debug)]
pub struct Transaction {
    id: TxId,
    snapshot: Snapshot,
    cid: AtomicU32,
    clog: Arc<CommitLog>,
    locks: Mutex<LockStore>,
    conflicted: AtomicBool,
    lock_timeout: Duration,
}

impl Transaction {
    pub(crate) fn new(
        id: TxId,
        snapshot: Snapshot,
        clog: Arc<CommitLog>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            id,
            snapshot,
            cid: AtomicU32::new(1),
            clog,
            locks: Mutex::new(LockStore::default()),
            conflicted: AtomicBool::new(false),
            lock_timeout,
        }
    }

    /// Transaction id.
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Ids that were active when this transaction began.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Current command id.
    pub fn cid(&self) -> CommandId {
        self.cid.load(Ordering::Acquire)
    }

    /// Deadline applied when waiting on another transaction's write intent.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Shared commit log used for visibility checks.
    pub fn commit_log(&self) -> &CommitLog {
        &self.clog
    }

    /// Recorded status of another transaction.
    pub fn status_of(&self, other: TxId) -> TxStatus {
        self.clog.status(other)
    }

    /// Returns `true` when `other` committed before this transaction started.
    ///
    /// Such a transaction's writes are part of this transaction's snapshot view.
    pub fn sees_committed(&self, other: TxId) -> bool {
        other != 0
            && other < self.id
            && !self.snapshot.contains(other)
            && self.clog.is_committed(other)
    }

    /// Takes the write intent on `lock`, waiting up to the lock timeout.
    pub fn take_lock(&self, lock: &Arc<RecordLock>) -> Result<()> {
        self.locks.lock().take(lock, self.id, self.lock_timeout)
    }

    /// Number of write intents held.
    pub fn held_locks(&self) -> usize {
        self.locks.lock().len()
    }

    /// Flags that a write in this transaction lost a conflict; commit will fail.
    pub fn mark_conflicted(&self) {
        self.conflicted.store(true, Ordering::Release);
    }

    /// Returns `true` once a write lost a conflict.
    pub fn is_conflicted(&self) -> bool {
        self.conflicted.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self) -> CommandId {
        self.cid.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn release_locks(&self) {
        self.locks.lock().release_all();
    }
}
