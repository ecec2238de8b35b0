//! Secondary indexes over version lists.
//!
//! Entries are a superset of the true matches: they are added whenever a
//! mutation might satisfy a key, never removed on mutation, and pruned only by
//! `refresh`. Every lookup revalidates against the record visible to the
//! reading transaction.

mod core;
mod key;
mod label;
mod label_property;

pub use self::core::{IndexState, IndexedVlists, KeyIndex};
pub use key::{IndexPredicate, LabelPropertyKey, LabelPropertyValue};
pub use label::{EdgeTypeIndex, LabelIndex};
pub use label_property::LabelPropertyIndex;
