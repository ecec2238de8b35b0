use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::primitives::concurrency::RecordLock;
use crate::txn::{CommitLog, Transaction, TxStatus, Watermark};
use crate::types::{CommandId, GraphError, Gid, Result};

use super::record::{Record, Stamp, View};

/// Result of pruning one version list.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GcOutcome {
    /// Records unlinked from the chain.
    pub reclaimed_records: usize,
    /// The entity is deleted for every reader and can be dropped from storage.
    pub fully_dead: bool,
}

/// Chain of versions for one entity.
///
/// Records are kept oldest first; readers walk from the newest end. The
/// write-intent lock serializes `update` and `remove` across transactions.
pub struct VersionList<T> {
    gid: Gid,
    chain: RwLock<Vec<Arc<Record<T>>>>,
    lock: Arc<RecordLock>,
}

impl<T> VersionList<T> {
    /// Global id of the entity.
    pub fn gid(&self) -> Gid {
        self.gid
    }
}

impl<T: Clone> VersionList<T> {
    /// Creates a version list whose first record is owned by `tx`.
    ///
    /// Returns the list and the new record so the caller can finish
    /// initializing the payload within the same command.
    pub fn new(tx: &Transaction, gid: Gid, data: T) -> (Arc<Self>, Arc<Record<T>>) {
        let record = Arc::new(Record::new(Stamp::current(tx), data));
        let vlist = Arc::new(Self {
            gid,
            chain: RwLock::new(vec![Arc::clone(&record)]),
            lock: Arc::new(RecordLock::new()),
        });
        (vlist, record)
    }

    /// Record visible to `tx` at its current command.
    pub fn find(&self, tx: &Transaction) -> Option<Arc<Record<T>>> {
        self.find_view(tx, View::New)
    }

    /// Record visible to `tx` under `view`.
    pub fn find_view(&self, tx: &Transaction, view: View) -> Option<Arc<Record<T>>> {
        let chain = self.chain.read();
        find_in(&chain, tx, view.command(tx)).cloned()
    }

    /// Records visible under the old and new views, in that order.
    pub fn find_old_new(&self, tx: &Transaction) -> (Option<Arc<Record<T>>>, Option<Arc<Record<T>>>) {
        let chain = self.chain.read();
        let cid = tx.cid();
        let new = find_in(&chain, tx, cid).cloned();
        let old = find_in(&chain, tx, cid.saturating_sub(1)).cloned();
        (old, new)
    }

    /// Returns a record `tx` may modify in its current command.
    ///
    /// When the visible record was created by this very command it is returned
    /// as is. Otherwise its payload is copied into a new head record and the old
    /// one is expired. Fails with [`GraphError::RecordDeleted`] when nothing is
    /// visible, [`GraphError::Serialization`] when a concurrent transaction
    /// already committed a change, and [`GraphError::LockTimeout`] when the
    /// write intent is not acquired in time.
    pub fn update(&self, tx: &Transaction) -> Result<Arc<Record<T>>> {
        let stamp = Stamp::current(tx);
        let visible = self.find(tx).ok_or(GraphError::RecordDeleted)?;
        if visible.created() == stamp {
            return Ok(visible);
        }
        self.lock_and_validate(tx, &visible)?;

        let mut chain = self.chain.write();
        unlink_aborted_heads(&mut chain, tx);
        let visible = Arc::clone(find_in(&chain, tx, stamp.cmd).ok_or(GraphError::RecordDeleted)?);
        if visible.created() == stamp {
            return Ok(visible);
        }
        self.check_expiry(tx, &visible)?;

        let record = Arc::new(Record::new(stamp, visible.data().clone()));
        visible.mark_expired(stamp);
        chain.push(Arc::clone(&record));
        Ok(record)
    }

    /// Expires the record visible to `tx`.
    pub fn remove(&self, tx: &Transaction) -> Result<()> {
        let stamp = Stamp::current(tx);
        let visible = self.find(tx).ok_or(GraphError::RecordDeleted)?;
        self.lock_and_validate(tx, &visible)?;

        let mut chain = self.chain.write();
        unlink_aborted_heads(&mut chain, tx);
        let visible = Arc::clone(find_in(&chain, tx, stamp.cmd).ok_or(GraphError::RecordDeleted)?);
        self.check_expiry(tx, &visible)?;
        visible.mark_expired(stamp);
        Ok(())
    }

    /// Prunes records no reader can reach any more.
    ///
    /// The newest record whose creator is visible to everyone is the floor;
    /// older records are unlinked, as are records created by aborted
    /// transactions. When the floor itself is expired for everyone the entity
    /// is fully dead.
    pub fn gc(&self, watermark: &Watermark, clog: &CommitLog) -> GcOutcome {
        let mut chain = self.chain.write();
        let before = chain.len();
        chain.retain(|r| !clog.is_aborted(r.created().tx));

        let mut fully_dead = chain.is_empty();
        if let Some(floor) = chain
            .iter()
            .rposition(|r| watermark.visible_to_all(r.created().tx, clog))
        {
            chain.drain(..floor);
            let dead = chain.len() == 1
                && chain[0]
                    .expired()
                    .is_some_and(|stamp| watermark.visible_to_all(stamp.tx, clog));
            if dead {
                chain.clear();
                fully_dead = true;
            }
        }
        GcOutcome {
            reclaimed_records: before - chain.len(),
            fully_dead,
        }
    }

    /// All records, newest first.
    pub fn records(&self) -> Vec<Arc<Record<T>>> {
        self.chain.read().iter().rev().cloned().collect()
    }

    /// Number of records in the chain.
    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    /// Returns `true` when the chain holds no records.
    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    /// Write-intent lock guarding the chain.
    pub fn record_lock(&self) -> &Arc<RecordLock> {
        &self.lock
    }

    fn lock_and_validate(&self, tx: &Transaction, visible: &Record<T>) -> Result<()> {
        self.check_expiry(tx, visible)?;
        tx.take_lock(&self.lock)
    }

    fn check_expiry(&self, tx: &Transaction, visible: &Record<T>) -> Result<()> {
        let Some(expired) = visible.expired() else {
            return Ok(());
        };
        if expired.tx == tx.id() {
            return Ok(());
        }
        match tx.status_of(expired.tx) {
            TxStatus::Aborted => Ok(()),
            TxStatus::Committed => {
                tx.mark_conflicted();
                debug!(
                    tx = tx.id(),
                    gid = self.gid.0,
                    winner = expired.tx,
                    "mvcc.serialization_conflict"
                );
                Err(GraphError::Serialization { tx: tx.id() })
            }
            // The expirer still holds the write intent; acquiring it waits.
            TxStatus::Active if self.lock.owner() != Some(tx.id()) => Ok(()),
            TxStatus::Active => {
                tx.mark_conflicted();
                Err(GraphError::Serialization { tx: tx.id() })
            }
        }
    }
}

fn find_in<'a, T>(
    chain: &'a [Arc<Record<T>>],
    tx: &Transaction,
    cmd: CommandId,
) -> Option<&'a Arc<Record<T>>> {
    let candidate = chain.iter().rev().find(|r| r.created_visible(tx, cmd))?;
    if candidate.expired_effective(tx, cmd) {
        return None;
    }
    Some(candidate)
}

fn unlink_aborted_heads<T>(chain: &mut Vec<Arc<Record<T>>>, tx: &Transaction) {
    while let Some(head) = chain.last() {
        let creator = head.created().tx;
        if creator == tx.id() || !tx.commit_log().is_aborted(creator) {
            break;
        }
        chain.pop();
    }
}

impl<T: fmt::Debug> fmt::Debug for VersionList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionList")
            .field("gid", &self.gid)
            .field("records", &self.chain.read().len())
            .finish()
    }
}
