use std::fmt;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::txn::{CommitLog, Transaction, Watermark};
use crate::types::{CommandId, TxId};

/// Which command boundary a read observes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum View {
    /// State before the current command: own writes of earlier commands only.
    Old,
    /// State including the current command's own writes.
    New,
}

impl View {
    /// Command id at which visibility is evaluated for `tx`.
    pub fn command(self, tx: &Transaction) -> CommandId {
        match self {
            View::New => tx.cid(),
            View::Old => tx.cid().saturating_sub(1),
        }
    }
}

/// (transaction, command) pair that created or expired a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Stamp {
    /// Transaction id.
    pub tx: TxId,
    /// Command id within that transaction.
    pub cmd: CommandId,
}

impl Stamp {
    /// Creates a stamp.
    pub fn new(tx: TxId, cmd: CommandId) -> Self {
        Self { tx, cmd }
    }

    /// Stamp for `tx` at its current command.
    pub fn current(tx: &Transaction) -> Self {
        Self::new(tx.id(), tx.cid())
    }
}

/// One version of an entity.
///
/// The creation stamp is fixed. The expiration stamp is set when a later
/// version supersedes or deletes this one, and may be overwritten only when the
/// previous expirer aborted. The payload is mutated only by the creating
/// transaction within its creating command.
pub struct Record<T> {
    created: Stamp,
    expired: Mutex<Option<Stamp>>,
    data: RwLock<T>,
}

impl<T> Record<T> {
    /// Creates an unexpired record.
    pub fn new(created: Stamp, data: T) -> Self {
        Self {
            created,
            expired: Mutex::new(None),
            data: RwLock::new(data),
        }
    }

    /// Creation stamp.
    pub fn created(&self) -> Stamp {
        self.created
    }

    /// Expiration stamp, if any.
    pub fn expired(&self) -> Option<Stamp> {
        *self.expired.lock()
    }

    /// Read access to the payload.
    pub fn data(&self) -> RwLockReadGuard<'_, T> {
        self.data.read()
    }

    /// Write access to the payload.
    ///
    /// Only valid on a record returned by `VersionList::new` or
    /// `VersionList::update` for the caller's current command.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write()
    }

    pub(crate) fn mark_expired(&self, stamp: Stamp) {
        *self.expired.lock() = Some(stamp);
    }

    /// Whether `tx` at command `cmd` sees this record's creation.
    pub fn created_visible(&self, tx: &Transaction, cmd: CommandId) -> bool {
        if self.created.tx == tx.id() {
            return self.created.cmd <= cmd;
        }
        tx.sees_committed(self.created.tx)
    }

    /// Whether `tx` at command `cmd` sees this record as deleted.
    pub fn expired_effective(&self, tx: &Transaction, cmd: CommandId) -> bool {
        match self.expired() {
            None => false,
            Some(stamp) if stamp.tx == tx.id() => stamp.cmd <= cmd,
            Some(stamp) => tx.sees_committed(stamp.tx),
        }
    }

    /// Whether the record is the visible floor for `tx` under `view`.
    pub fn visible(&self, tx: &Transaction, view: View) -> bool {
        let cmd = view.command(tx);
        self.created_visible(tx, cmd) && !self.expired_effective(tx, cmd)
    }

    /// Whether some present or future reader may still observe this record.
    pub fn potentially_visible(&self, watermark: &Watermark, clog: &CommitLog) -> bool {
        if clog.is_aborted(self.created.tx) {
            return false;
        }
        match self.expired() {
            Some(stamp) => !watermark.visible_to_all(stamp.tx, clog),
            None => true,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("created", &self.created)
            .field("expired", &self.expired())
            .field("data", &*self.data.read())
            .finish()
    }
}
