//! Write-intent locks taken by transactions on version lists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::types::{GraphError, Result, TxId};

/// Outcome of a successful [`RecordLock::lock`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockStatus {
    /// The lock was free and is now owned by the caller.
    Acquired,
    /// The caller already owned the lock.
    AlreadyHeld,
}

/// Exclusive, transaction-owned write intent on a single version list.
///
/// The lock is owned by a transaction id rather than a thread, so it survives
/// across statements and is released only when the transaction ends.
#[derive(Debug, Default)]
pub struct RecordLock {
    owner: Mutex<TxId>,
    released: Condvar,
}

impl RecordLock {
    /// Creates an unowned lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `tx`, waiting up to `timeout` for the current owner to release it.
    pub fn lock(&self, tx: TxId, timeout: Duration) -> Result<LockStatus> {
        let deadline = Instant::now() + timeout;
        let mut owner = self.owner.lock();
        loop {
            if *owner == 0 {
                *owner = tx;
                return Ok(LockStatus::Acquired);
            }
            if *owner == tx {
                return Ok(LockStatus::AlreadyHeld);
            }
            let holder = *owner;
            if self.released.wait_until(&mut owner, deadline).timed_out() && *owner != 0 {
                debug!(tx, holder, "mvcc.lock.timeout");
                return Err(GraphError::LockTimeout { tx });
            }
        }
    }

    /// Releases the lock and wakes waiters.
    pub fn unlock(&self) {
        let mut owner = self.owner.lock();
        *owner = 0;
        drop(owner);
        self.released.notify_all();
    }

    /// Returns the current owner, if any.
    pub fn owner(&self) -> Option<TxId> {
        match *self.owner.lock() {
            0 => None,
            tx => Some(tx),
        }
    }
}

/// Set of locks held by one transaction, released together on commit or abort.
#[derive(Debug, Default)]
pub struct LockStore {
    locks: Vec<Arc<RecordLock>>,
}

impl LockStore {
    /// Acquires `lock` on behalf of `tx` and remembers it for release.
    pub fn take(&mut self, lock: &Arc<RecordLock>, tx: TxId, timeout: Duration) -> Result<()> {
        if lock.lock(tx, timeout)? == LockStatus::Acquired {
            self.locks.push(Arc::clone(lock));
        }
        Ok(())
    }

    /// Number of locks currently held.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` when no locks are held.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Releases every held lock.
    pub fn release_all(&mut self) {
        for lock in self.locks.drain(..) {
            lock.unlock();
        }
    }
}

impl Drop for LockStore {
    fn drop(&mut self) {
        self.release_all();
    }
}
