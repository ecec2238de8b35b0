//! Low-level primitives for building the storage engine.
//!
//! Includes the growable bitset used by the commit log and the
//! transaction-owned write-intent locks.

/// Growable concurrent bitset.
pub mod bitset;

/// Concurrency primitives and synchronization.
///
/// Write-intent locks owned by transactions rather than threads.
pub mod concurrency;
