//! Live descriptors held by a resolver.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::criteria::CriteriaSet;
use crate::index::{IndexLookup, MetadataIndex, SecondaryIndexManager};
use crate::types::EntityDescriptor;

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<String, Vec<Arc<EntityDescriptor>>>,
    ordered: Vec<Arc<EntityDescriptor>>,
}

/// Entity ID → descriptors, an insertion-ordered list of every descriptor,
/// and the secondary indexes over them.
///
/// Descriptors are keyed by their trimmed entity ID.
#[derive(Debug)]
pub struct EntityBackingStore {
    entries: RwLock<Entries>,
    indexes: SecondaryIndexManager<String>,
}

impl EntityBackingStore {
    pub fn new(indexes: impl IntoIterator<Item = Arc<dyn MetadataIndex>>) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            indexes: SecondaryIndexManager::by_entity_id(indexes),
        }
    }

    /// Descriptors for `entity_id`; empty if none are live.
    pub fn get(&self, entity_id: &str) -> Vec<Arc<EntityDescriptor>> {
        self.entries
            .read()
            .by_id
            .get(entity_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entries.read().by_id.contains_key(entity_id)
    }

    /// Make `descriptor` the only live descriptor for `entity_id`.
    ///
    /// Returns the descriptors it superseded.
    pub fn replace(&self, entity_id: &str, descriptor: EntityDescriptor) -> Vec<Arc<EntityDescriptor>> {
        let descriptor = Arc::new(descriptor);
        let mut entries = self.entries.write();

        let superseded = entries.by_id.remove(entity_id).unwrap_or_default();
        self.forget(&mut entries, &superseded);

        self.indexes.index_descriptor(&descriptor);
        entries.ordered.push(Arc::clone(&descriptor));
        entries.by_id.insert(entity_id.to_string(), vec![descriptor]);
        trace!(entity_id, superseded = superseded.len(), "replaced live descriptor");
        superseded
    }

    /// Drop every descriptor for `entity_id`, returning them.
    pub fn remove(&self, entity_id: &str) -> Vec<Arc<EntityDescriptor>> {
        let mut entries = self.entries.write();
        let removed = entries.by_id.remove(entity_id).unwrap_or_default();
        self.forget(&mut entries, &removed);
        removed
    }

    fn forget(&self, entries: &mut Entries, descriptors: &[Arc<EntityDescriptor>]) {
        if descriptors.is_empty() {
            return;
        }
        for descriptor in descriptors {
            self.indexes.deindex_descriptor(descriptor);
        }
        entries
            .ordered
            .retain(|d| !descriptors.iter().any(|old| Arc::ptr_eq(d, old)));
    }

    /// Number of entity IDs with live descriptors.
    pub fn len(&self) -> usize {
        self.entries.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().by_id.is_empty()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.entries.read().by_id.keys().cloned().collect()
    }

    /// Every live descriptor in insertion order.
    pub fn ordered(&self) -> Vec<Arc<EntityDescriptor>> {
        self.entries.read().ordered.clone()
    }

    /// Resolve `criteria` through the secondary indexes.
    ///
    /// `NotApplicable` when no index understood the criteria; otherwise the
    /// matching entity IDs, possibly none.
    pub fn lookup_indexed(&self, criteria: &CriteriaSet) -> IndexLookup<String> {
        self.indexes.lookup(criteria)
    }

    /// Live descriptors for `entity_ids`, in insertion order.
    pub fn get_all(&self, entity_ids: &HashSet<String>) -> Vec<Arc<EntityDescriptor>> {
        if entity_ids.is_empty() {
            return Vec::new();
        }
        self.entries
            .read()
            .ordered
            .iter()
            .filter(|d| d.trimmed_entity_id().is_some_and(|id| entity_ids.contains(id)))
            .cloned()
            .collect()
    }

    pub fn indexes(&self) -> &SecondaryIndexManager<String> {
        &self.indexes
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.by_id.clear();
        entries.ordered.clear();
        self.indexes.clear();
    }
}
