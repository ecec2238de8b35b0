//! Identifiers, the crate-wide error type, and the `Result` alias.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distributed::slk::SlkError;

/// Transaction identifier. Issued monotonically starting at 1; 0 means "none".
pub type TxId = u64;

/// Command identifier within a transaction. The first command is 1.
pub type CommandId = u32;

/// Position of a transaction in the global commit order.
pub type CommitSeq = u64;

/// Global identifier of a vertex or an edge.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Gid(pub u64);

/// Interned label identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct LabelId(pub u32);

/// Interned property-name identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct PropertyId(pub u32);

/// Interned edge-type identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EdgeTypeId(pub u32);

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LabelId {
    fn from(value: u32) -> Self {
        LabelId(value)
    }
}

impl From<u32> for PropertyId {
    fn from(value: u32) -> Self {
        PropertyId(value)
    }
}

impl From<u32> for EdgeTypeId {
    fn from(value: u32) -> Self {
        EdgeTypeId(value)
    }
}

/// Errors surfaced by the storage core.
///
/// Only [`GraphError::Serialization`] and [`GraphError::LockTimeout`] are
/// expected to reach an end user; callers should abort and retry the whole
/// transaction when [`GraphError::is_retryable`] returns `true`.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// Write-write conflict with a concurrent transaction.
    #[error("serialization error: transaction {tx} lost a write-write conflict")]
    Serialization {
        /// Transaction that lost the conflict.
        tx: TxId,
    },
    /// Write intent was not acquired before the configured deadline.
    #[error("lock timeout: transaction {tx} could not acquire a write intent")]
    LockTimeout {
        /// Transaction that timed out.
        tx: TxId,
    },
    /// Mutation attempted on a record that is already deleted for the caller.
    #[error("record deleted")]
    RecordDeleted,
    /// A remote record transfer completed but the requested version is missing.
    #[error("reconstruction error: {0}")]
    Reconstruction(String),
    /// The transaction already committed or aborted.
    #[error("transaction {0} is not active")]
    TransactionNotActive(TxId),
    /// The index key is already being built or is ready.
    #[error("index already exists")]
    IndexExists,
    /// The vertex still has attached edges and cannot be removed.
    #[error("vertex {0} has attached edges")]
    VertexHasEdges(Gid),
    /// A requested entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Internal state violated an invariant.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// I/O failure in a durability collaborator.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration parsing failure.
    #[error("config: {0}")]
    Toml(#[from] toml::de::Error),
    /// Segment stream framing failure.
    #[error("slk: {0}")]
    Slk(#[from] SlkError),
}

impl GraphError {
    /// Returns `true` for conflict-class errors that warrant retrying the whole transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GraphError::Serialization { .. } | GraphError::LockTimeout { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
