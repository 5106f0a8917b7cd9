//! Multi-index query engine.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

use super::{IndexLookup, IndexStore, MetadataIndex};
use crate::criteria::CriteriaSet;
use crate::types::EntityDescriptor;

type Extractor<T> = Arc<dyn Fn(&EntityDescriptor) -> Option<T> + Send + Sync>;

/// Owns a fixed set of index plugins, each with its own [`IndexStore`].
///
/// Stored values are derived from descriptors by an extractor function;
/// the resolver stores entity IDs and maps them back to descriptors.
pub struct SecondaryIndexManager<T> {
    indexes: Vec<(Arc<dyn MetadataIndex>, IndexStore<T>)>,
    extractor: Extractor<T>,
}

impl SecondaryIndexManager<String> {
    /// Manager storing trimmed entity IDs.
    pub fn by_entity_id(indexes: impl IntoIterator<Item = Arc<dyn MetadataIndex>>) -> Self {
        Self::new(indexes, |d: &EntityDescriptor| {
            d.trimmed_entity_id().map(str::to_string)
        })
    }
}

impl<T: Clone + Eq + Hash> SecondaryIndexManager<T> {
    pub fn new(
        indexes: impl IntoIterator<Item = Arc<dyn MetadataIndex>>,
        extractor: impl Fn(&EntityDescriptor) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            indexes: indexes
                .into_iter()
                .map(|index| (index, IndexStore::new()))
                .collect(),
            extractor: Arc::new(extractor),
        }
    }

    /// Configured plugins.
    pub fn indexes(&self) -> impl Iterator<Item = &Arc<dyn MetadataIndex>> {
        self.indexes.iter().map(|(index, _)| index)
    }

    /// Store of the plugin at `position`.
    pub fn store(&self, position: usize) -> Option<&IndexStore<T>> {
        self.indexes.get(position).map(|(_, store)| store)
    }

    /// Add `descriptor` under every key each plugin derives from it.
    pub fn index_descriptor(&self, descriptor: &EntityDescriptor) {
        let Some(value) = (self.extractor)(descriptor) else {
            trace!(entity_id = %descriptor.entity_id, "no index value extracted, not indexing");
            return;
        };
        for (index, store) in &self.indexes {
            for key in index.keys_for_descriptor(descriptor) {
                trace!(index = index.name(), %key, "indexing descriptor");
                store.add(key, value.clone());
            }
        }
    }

    /// Remove `descriptor` from every key each plugin derives from it.
    pub fn deindex_descriptor(&self, descriptor: &EntityDescriptor) {
        let Some(value) = (self.extractor)(descriptor) else {
            return;
        };
        for (index, store) in &self.indexes {
            for key in index.keys_for_descriptor(descriptor) {
                store.remove(&key, &value);
            }
        }
    }

    /// Resolve `criteria` against every plugin that understands it.
    ///
    /// Per-plugin results are the union over that plugin's keys; results are
    /// intersected across plugins.
    pub fn lookup(&self, criteria: &CriteriaSet) -> IndexLookup<T> {
        let mut accumulator: Option<HashSet<T>> = None;

        for (index, store) in &self.indexes {
            let Some(keys) = index.keys_for_criteria(criteria) else {
                trace!(index = index.name(), "index not applicable to criteria");
                continue;
            };

            let mut matched = HashSet::new();
            for key in &keys {
                matched.extend(store.lookup(key));
            }
            trace!(index = index.name(), keys = keys.len(), matched = matched.len(), "index lookup");

            let current = match accumulator {
                None => matched,
                Some(previous) => previous.intersection(&matched).cloned().collect(),
            };
            if current.is_empty() {
                return IndexLookup::Matched(HashSet::new());
            }
            accumulator = Some(current);
        }

        match accumulator {
            Some(set) => IndexLookup::Matched(set),
            None => IndexLookup::NotApplicable,
        }
    }

    pub fn clear(&self) {
        for (_, store) in &self.indexes {
            store.clear();
        }
    }
}

impl<T> fmt::Debug for SecondaryIndexManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.indexes.iter().map(|(index, _)| index.name()).collect();
        f.debug_struct("SecondaryIndexManager")
            .field("indexes", &names)
            .finish()
    }
}
