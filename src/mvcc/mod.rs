//! Multiversion records and per-entity version lists.
//!
//! A record is visible to transaction `T` at command `C` when it was created by
//! `T` at a command `<= C`, or by a transaction `T` sees as committed; the
//! newest such record is the candidate, and it is reported as deleted when its
//! expiration is likewise visible.

mod record;
mod version_list;

pub use record::{Record, Stamp, View};
pub use version_list::{GcOutcome, VersionList};
