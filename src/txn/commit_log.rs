use crate::primitives::bitset::DynamicBitset;
use crate::types::TxId;

const COMMITTED_BIT: u64 = 0b01;
const ABORTED_BIT: u64 = 0b10;

/// Lifecycle state of a transaction as recorded in the [`CommitLog`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxStatus {
    /// Running, or never issued.
    Active,
    /// Committed; its records become visible to later snapshots.
    Committed,
    /// Aborted; its records are permanently invisible.
    Aborted,
}

/// Two bits of status per transaction id, readable without taking the engine lock.
#[derive(Debug, Default)]
pub struct CommitLog {
    log: DynamicBitset,
}

impl CommitLog {
    /// Creates an empty log where every id reads as active.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded status of `id`.
    pub fn status(&self, id: TxId) -> TxStatus {
        match self.log.at(slot(id), 2) {
            0 => TxStatus::Active,
            COMMITTED_BIT => TxStatus::Committed,
            ABORTED_BIT => TxStatus::Aborted,
            // Both bits set never happens through the public API.
            _ => TxStatus::Aborted,
        }
    }

    /// Returns `true` when `id` committed.
    pub fn is_committed(&self, id: TxId) -> bool {
        self.status(id) == TxStatus::Committed
    }

    /// Returns `true` when `id` aborted.
    pub fn is_aborted(&self, id: TxId) -> bool {
        self.status(id) == TxStatus::Aborted
    }

    /// Returns `true` while `id` has neither committed nor aborted.
    pub fn is_active(&self, id: TxId) -> bool {
        self.status(id) == TxStatus::Active
    }

    pub(crate) fn set_committed(&self, id: TxId) {
        self.log.set(slot(id), 1);
    }

    pub(crate) fn set_aborted(&self, id: TxId) {
        self.log.set(slot(id) + 1, 1);
    }
}

fn slot(id: TxId) -> usize {
    (id as usize) * 2
}
