//! Per-plugin key → values storage.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use parking_lot::RwLock;

use super::IndexKey;

/// One index's key → set-of-values map.
///
/// Safe for concurrent use. Entries never expire; they are removed
/// explicitly when the indexed value goes away.
#[derive(Debug)]
pub struct IndexStore<T> {
    entries: RwLock<HashMap<IndexKey, HashSet<T>>>,
}

impl<T: Clone + Eq + Hash> IndexStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of the values stored under `key` (empty if none).
    pub fn lookup(&self, key: &IndexKey) -> HashSet<T> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    pub fn add(&self, key: IndexKey, value: T) {
        self.entries.write().entry(key).or_default().insert(value);
    }

    /// Remove `value` from `key`, dropping the key once it has no values.
    pub fn remove(&self, key: &IndexKey, value: &T) {
        let mut entries = self.entries.write();
        if let Some(values) = entries.get_mut(key) {
            values.remove(value);
            if values.is_empty() {
                entries.remove(key);
            }
        }
    }

    /// Remove every value stored under `key`.
    pub fn clear_key(&self, key: &IndexKey) {
        self.entries.write().remove(key);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Snapshot of the current keys.
    pub fn keys(&self) -> HashSet<IndexKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone + Eq + Hash> Default for IndexStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
