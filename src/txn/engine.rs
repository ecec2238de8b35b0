use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::types::{CommandId, CommitSeq, GraphError, Result, TxId};

use super::commit_log::{CommitLog, TxStatus};
use super::snapshot::Snapshot;
use super::transaction::Transaction;

/// Reclamation boundary handed to garbage collection and index refresh.
///
/// A transaction `x` is visible to every present and future reader iff it
/// committed, `x < oldest_active`, and `x` is absent from `snapshot` (the
/// oldest active transaction's snapshot).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Watermark {
    /// Oldest active transaction id, or the next id to issue when idle.
    pub oldest_active: TxId,
    /// Snapshot of the oldest active transaction.
    pub snapshot: Snapshot,
}

impl Watermark {
    /// Creates a watermark from its parts.
    pub fn new(oldest_active: TxId, snapshot: Snapshot) -> Self {
        Self {
            oldest_active,
            snapshot,
        }
    }

    /// Returns `true` when the effects of `id` are visible to every reader.
    pub fn visible_to_all(&self, id: TxId, clog: &CommitLog) -> bool {
        id != 0 && id < self.oldest_active && !self.snapshot.contains(id) && clog.is_committed(id)
    }
}

#[derive(Debug, Default)]
struct EngineState {
    counter: TxId,
    commit_seq: CommitSeq,
    active: BTreeMap<TxId, Arc<Transaction>>,
}

/// Issues transaction ids, tracks the active set, and linearizes commits.
///
/// All bookkeeping runs under one mutex; the commit log is readable without it.
#[derive(Debug)]
pub struct Engine {
    state: Mutex<EngineState>,
    clog: Arc<CommitLog>,
    lock_timeout: Duration,
}

impl Engine {
    /// Creates an engine whose transactions wait up to `lock_timeout` for write intents.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            clog: Arc::new(CommitLog::new()),
            lock_timeout,
        }
    }

    /// Starts a transaction whose snapshot is the current active set.
    pub fn begin(&self) -> Arc<Transaction> {
        let mut state = self.state.lock();
        state.counter += 1;
        let id = state.counter;
        let snapshot: Snapshot = state.active.keys().copied().collect();
        let tx = Arc::new(Transaction::new(
            id,
            snapshot,
            Arc::clone(&self.clog),
            self.lock_timeout,
        ));
        state.active.insert(id, Arc::clone(&tx));
        debug!(tx = id, active = state.active.len(), "txn.begin");
        tx
    }

    /// Moves transaction `id` to its next command and returns the new command id.
    pub fn advance(&self, id: TxId) -> Result<CommandId> {
        let state = self.state.lock();
        let tx = state
            .active
            .get(&id)
            .ok_or(GraphError::TransactionNotActive(id))?;
        Ok(tx.advance())
    }

    /// Commits `tx`, returning its position in the commit order.
    ///
    /// A transaction flagged as conflicted is aborted instead and the call
    /// fails with [`GraphError::Serialization`].
    pub fn commit(&self, tx: &Transaction) -> Result<CommitSeq> {
        let id = tx.id();
        let mut state = self.state.lock();
        if state.active.remove(&id).is_none() {
            return Err(GraphError::TransactionNotActive(id));
        }
        if tx.is_conflicted() {
            self.clog.set_aborted(id);
            drop(state);
            tx.release_locks();
            debug!(tx = id, "txn.abort.conflicted");
            return Err(GraphError::Serialization { tx: id });
        }
        self.clog.set_committed(id);
        state.commit_seq += 1;
        let seq = state.commit_seq;
        drop(state);
        tx.release_locks();
        debug!(tx = id, seq, "txn.commit");
        Ok(seq)
    }

    /// Aborts `tx`; its records become permanently invisible.
    pub fn abort(&self, tx: &Transaction) -> Result<()> {
        let id = tx.id();
        let mut state = self.state.lock();
        if state.active.remove(&id).is_none() {
            return Err(GraphError::TransactionNotActive(id));
        }
        self.clog.set_aborted(id);
        drop(state);
        tx.release_locks();
        debug!(tx = id, "txn.abort");
        Ok(())
    }

    /// Oldest active transaction id, or the next id to be issued when idle.
    pub fn oldest_active(&self) -> TxId {
        let state = self.state.lock();
        state
            .active
            .keys()
            .next()
            .copied()
            .unwrap_or(state.counter + 1)
    }

    /// Computes the boundary below which versions may be reclaimed.
    pub fn gc_watermark(&self) -> Watermark {
        let state = self.state.lock();
        match state.active.values().next() {
            Some(oldest) => Watermark::new(oldest.id(), oldest.snapshot().clone()),
            None => Watermark::new(state.counter + 1, Snapshot::default()),
        }
    }

    /// Status of `id` in the commit log.
    pub fn info(&self, id: TxId) -> TxStatus {
        self.clog.status(id)
    }

    /// Returns `true` while `id` is in the active set.
    pub fn is_active(&self, id: TxId) -> bool {
        self.state.lock().active.contains_key(&id)
    }

    /// Returns the running transaction with `id`.
    pub fn running(&self, id: TxId) -> Option<Arc<Transaction>> {
        self.state.lock().active.get(&id).cloned()
    }

    /// Number of active transactions.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Last issued transaction id.
    pub fn count(&self) -> TxId {
        self.state.lock().counter
    }

    /// Number of commits so far.
    pub fn commit_seq(&self) -> CommitSeq {
        self.state.lock().commit_seq
    }

    /// Snapshot of the current active set.
    pub fn global_active(&self) -> Snapshot {
        self.state.lock().active.keys().copied().collect()
    }

    /// Calls `f` for each active transaction, oldest first.
    pub fn for_each_active(&self, mut f: impl FnMut(&Arc<Transaction>)) {
        let active: Vec<Arc<Transaction>> = self.state.lock().active.values().cloned().collect();
        for tx in &active {
            f(tx);
        }
    }

    /// Makes sure the next issued id is strictly greater than `id`.
    ///
    /// Used after recovery so new transactions never reuse persisted ids.
    pub fn ensure_next_id_greater(&self, id: TxId) {
        let mut state = self.state.lock();
        if state.counter < id {
            state.counter = id;
        }
    }

    /// Shared commit log.
    pub fn commit_log(&self) -> &Arc<CommitLog> {
        &self.clog
    }

    /// Write-intent deadline handed to new transactions.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
