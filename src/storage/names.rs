use parking_lot::RwLock;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
struct NameTable {
    by_name: FxHashMap<String, u32>,
    by_id: Vec<String>,
}

/// Concurrent interner mapping names to dense ids.
///
/// Interning is idempotent: the same name always yields the same id.
#[derive(Debug, Default)]
pub struct NameIdMapper {
    table: RwLock<NameTable>,
}

impl NameIdMapper {
    /// Creates an empty mapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `name`, assigning the next free id on first use.
    pub fn value_to_id(&self, name: &str) -> u32 {
        if let Some(id) = self.table.read().by_name.get(name) {
            return *id;
        }
        let mut table = self.table.write();
        if let Some(id) = table.by_name.get(name) {
            return *id;
        }
        let id = table.by_id.len() as u32;
        table.by_id.push(name.to_owned());
        table.by_name.insert(name.to_owned(), id);
        id
    }

    /// Returns the id of `name` without assigning one.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.table.read().by_name.get(name).copied()
    }

    /// Returns the name interned as `id`.
    pub fn id_to_value(&self, id: u32) -> Option<String> {
        self.table.read().by_id.get(id as usize).cloned()
    }

    /// All names in id order.
    pub fn names(&self) -> Vec<String> {
        self.table.read().by_id.clone()
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.table.read().by_id.len()
    }

    /// Returns `true` when nothing is interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
