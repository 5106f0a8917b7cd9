//! The dynamic resolver: fetch on demand, cache, refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::backing::EntityBackingStore;
use super::builder::DynamicResolverBuilder;
use super::config::ResolverConfig;
use super::expiration::ExpirationPolicy;
use super::management::{EntityManagementData, Lifecycle, ManagementTable};
use super::persistent::{DescriptorPredicate, PersistentCacheInitMetrics, PersistentCacheKeyGenerator};
use super::predicate::CriteriaPredicates;
use super::scheduler::TaskScheduler;
use crate::criteria::CriteriaSet;
use crate::index::IndexLookup;
use crate::persist::LoadSaveManager;
use crate::source::{MetadataFilter, OriginSource};
use crate::telemetry;
use crate::types::EntityDescriptor;
use crate::{HeimdallError, Result};

/// State shared between a resolver and its background tasks.
pub(crate) struct ResolverInner {
    pub(crate) id: String,
    pub(crate) config: ResolverConfig,
    pub(crate) policy: ExpirationPolicy,
    pub(crate) origin: Arc<dyn OriginSource>,
    pub(crate) filter: Option<Arc<dyn MetadataFilter>>,
    pub(crate) store: EntityBackingStore,
    pub(crate) management: ManagementTable,
    pub(crate) persistent_cache: Option<Arc<dyn LoadSaveManager>>,
    pub(crate) key_generator: PersistentCacheKeyGenerator,
    pub(crate) init_predicate: DescriptorPredicate,
    pub(crate) validity: DescriptorPredicate,
    pub(crate) init_metrics: Mutex<PersistentCacheInitMetrics>,
    pub(crate) destroyed: AtomicBool,
}

/// Resolves entity metadata by fetching it from an origin source on first
/// request and serving it from memory until it needs refreshing.
///
/// At most one task fetches a given entity ID at a time: concurrent
/// requests for a missing or stale entity wait on that entity's write lock
/// and then see the freshly stored document. Requests for other entity IDs
/// are unaffected.
///
/// Built with [`DynamicResolverBuilder`]; background tasks (the cleanup
/// sweeper and, optionally, the persistent cache bootstrap) run on the
/// tokio runtime `build()` was awaited on and stop on [`shutdown`] or drop.
///
/// [`shutdown`]: DynamicMetadataResolver::shutdown
pub struct DynamicMetadataResolver {
    inner: Arc<ResolverInner>,
    scheduler: TaskScheduler,
}

impl DynamicMetadataResolver {
    pub fn builder() -> DynamicResolverBuilder {
        DynamicResolverBuilder::new()
    }

    pub(crate) fn from_parts(inner: Arc<ResolverInner>, scheduler: TaskScheduler) -> Self {
        Self { inner, scheduler }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.inner.policy
    }

    /// Descriptors matching `criteria`.
    ///
    /// With an [`EntityIdCriterion`](crate::criteria::EntityIdCriterion) the
    /// entity is served from memory, fetched if missing, or refreshed if its
    /// refresh trigger has passed. Fetch failures are logged and whatever is
    /// cached (possibly nothing) is returned. Without one, the secondary
    /// indexes are consulted; this never fetches.
    ///
    /// Results are filtered by the predicate criteria in `criteria`.
    pub async fn resolve(&self, criteria: &CriteriaSet) -> Result<Vec<Arc<EntityDescriptor>>> {
        self.inner.ensure_live()?;
        let started = Instant::now();
        metrics::counter!(telemetry::RESOLVE_TOTAL, "resolver" => self.inner.id.clone()).increment(1);

        let resolved = match criteria.entity_id() {
            Some(entity_id) => {
                debug!(resolver = %self.inner.id, entity_id, "resolving metadata");
                let candidates = self.inner.resolve_entity(entity_id, criteria).await;
                CriteriaPredicates::from_criteria(criteria).filter(candidates, false)
            }
            None => self.inner.resolve_indexed(criteria),
        };

        metrics::histogram!(telemetry::RESOLVE_DURATION_SECONDS, "resolver" => self.inner.id.clone())
            .record(started.elapsed().as_secs_f64());
        Ok(resolved)
    }

    /// The first descriptor [`resolve`](Self::resolve) returns.
    pub async fn resolve_single(&self, criteria: &CriteriaSet) -> Result<Option<Arc<EntityDescriptor>>> {
        Ok(self.resolve(criteria).await?.into_iter().next())
    }

    /// Evict expired and idle entities now.
    ///
    /// Returns the number of entities whose metadata was evicted.
    pub async fn sweep(&self) -> usize {
        self.inner.sweep(Utc::now()).await
    }

    /// [`sweep`](Self::sweep) as if the current time were `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        self.inner.sweep(now).await
    }

    /// Load every entry from the persistent cache that is not already live.
    ///
    /// `build()` runs this once; calling it again reloads whatever has not
    /// been resolved since.
    pub async fn initialize_from_persistent_cache(&self) -> Result<PersistentCacheInitMetrics> {
        self.inner.ensure_live()?;
        Ok(self.inner.initialize_from_persistent_cache().await)
    }

    /// Counters from the most recent persistent cache bootstrap.
    pub fn persistent_cache_init_metrics(&self) -> PersistentCacheInitMetrics {
        self.inner.init_metrics.lock().clone()
    }

    /// Lifecycle tracker for `entity_id`, if the resolver has seen it.
    pub fn management_data(&self, entity_id: &str) -> Option<Arc<EntityManagementData>> {
        self.inner.management.get(entity_id.trim())
    }

    /// Number of entity IDs with live metadata.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Every live descriptor in the order it was stored.
    pub fn descriptors(&self) -> Vec<Arc<EntityDescriptor>> {
        self.inner.store.ordered()
    }

    /// Backing store holding the live descriptors and their indexes.
    pub fn backing_store(&self) -> &EntityBackingStore {
        &self.inner.store
    }

    /// Stop background tasks and drop all cached state.
    ///
    /// Later calls to `resolve` fail with [`HeimdallError::ShutDown`].
    pub fn shutdown(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.cancel_all();
        self.inner.store.clear();
        self.inner.management.clear();
        metrics::gauge!(telemetry::LIVE_ENTITIES, "resolver" => self.inner.id.clone()).set(0.0);
        info!(resolver = %self.inner.id, "resolver shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_destroyed()
    }
}

impl Drop for DynamicMetadataResolver {
    fn drop(&mut self) {
        self.inner.destroyed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for DynamicMetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicMetadataResolver")
            .field("id", &self.inner.id)
            .field("origin", &self.inner.origin.name())
            .field("live_entities", &self.inner.store.len())
            .field("persistent_cache", &self.inner.persistent_cache.is_some())
            .finish()
    }
}

impl ResolverInner {
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(HeimdallError::ShutDown);
        }
        Ok(())
    }

    /// Serve `entity_id` from memory, fetching it if missing or stale.
    async fn resolve_entity(&self, entity_id: &str, criteria: &CriteriaSet) -> Vec<Arc<EntityDescriptor>> {
        loop {
            let now = Utc::now();
            let tracker = self.management.get_or_create(entity_id, now);
            tracker.touch(now);

            {
                let lifecycle = tracker.read().await;
                if tracker.is_retired() {
                    continue;
                }
                let current = self.store.get(entity_id);
                if current.is_empty() {
                    debug!(resolver = %self.id, entity_id, "metadata not in backing store, resolving dynamically");
                } else if ExpirationPolicy::should_refresh(lifecycle.refresh_trigger, Utc::now()) {
                    debug!(resolver = %self.id, entity_id, "refresh trigger passed, refreshing metadata");
                } else {
                    debug!(resolver = %self.id, entity_id, "found metadata in backing store");
                    return current;
                }
            }

            let mut lifecycle = tracker.write().await;
            if tracker.is_retired() {
                continue;
            }
            return self.fetch_and_store(entity_id, criteria, &mut lifecycle).await;
        }
    }

    /// Fetch `entity_id` from the origin unless another task already did
    /// while this one waited. Caller holds the entity's write lock.
    async fn fetch_and_store(
        &self,
        entity_id: &str,
        criteria: &CriteriaSet,
        lifecycle: &mut Lifecycle,
    ) -> Vec<Arc<EntityDescriptor>> {
        let current = self.store.get(entity_id);
        if !current.is_empty() && !ExpirationPolicy::should_refresh(lifecycle.refresh_trigger, Utc::now()) {
            debug!(resolver = %self.id, entity_id, "metadata was stored by another task while waiting");
            return current;
        }

        let started = Instant::now();
        let fetched = self.origin.fetch(criteria).await;
        metrics::histogram!(telemetry::ORIGIN_FETCH_DURATION_SECONDS, "resolver" => self.id.clone())
            .record(started.elapsed().as_secs_f64());

        let status = match fetched {
            Ok(None) => {
                debug!(resolver = %self.id, entity_id, source = self.origin.name(), "no metadata fetched from origin");
                "empty"
            }
            Ok(Some(descriptor)) => {
                if self.is_destroyed() {
                    return Vec::new();
                }
                if let Err(e) = self.process_new_metadata(descriptor, entity_id, lifecycle, false) {
                    error!(resolver = %self.id, entity_id, error = %e, "failed to process fetched metadata");
                }
                "ok"
            }
            Err(e) => {
                error!(
                    resolver = %self.id,
                    entity_id,
                    source = self.origin.name(),
                    error = %e,
                    "error fetching metadata from origin"
                );
                "error"
            }
        };
        metrics::counter!(telemetry::ORIGIN_FETCH_TOTAL,
            "resolver" => self.id.clone(),
            "status" => status,
        )
        .increment(1);

        self.store.get(entity_id)
    }

    /// Query the secondary indexes; never fetches.
    fn resolve_indexed(&self, criteria: &CriteriaSet) -> Vec<Arc<EntityDescriptor>> {
        let predicates = CriteriaPredicates::from_criteria(criteria);
        match self.store.lookup_indexed(criteria) {
            IndexLookup::Matched(entity_ids) => {
                debug!(resolver = %self.id, matched = entity_ids.len(), "resolved candidates via secondary indexes");
                let now = Utc::now();
                for entity_id in &entity_ids {
                    if let Some(tracker) = self.management.get(entity_id) {
                        tracker.touch(now);
                    }
                }
                predicates.filter(self.store.get_all(&entity_ids), false)
            }
            IndexLookup::NotApplicable if self.config.resolve_via_predicates_only => {
                debug!(resolver = %self.id, "filtering all live metadata by predicates");
                predicates.filter(self.store.ordered(), true)
            }
            IndexLookup::NotApplicable => {
                debug!(resolver = %self.id, "no entity ID and no applicable index, returning nothing");
                Vec::new()
            }
        }
    }

    /// Filter `descriptor`, check it is `expected_id`, and make it live.
    ///
    /// Caller holds the entity's write lock. When loading from the
    /// persistent cache an empty filter result or an entity ID mismatch is
    /// an error; for a fresh fetch both are logged and leave the entity,
    /// and its persisted copy, as they were.
    pub(crate) fn process_new_metadata(
        &self,
        descriptor: EntityDescriptor,
        expected_id: &str,
        lifecycle: &mut Lifecycle,
        from_persistent_cache: bool,
    ) -> Result<()> {
        // Persist what the origin sent, not what the filters made of it
        let original = (self.persistent_cache.is_some() && !from_persistent_cache).then(|| descriptor.clone());

        let filtered = match &self.filter {
            Some(filter) => filter.filter(descriptor)?,
            None => Some(descriptor),
        };

        let Some(filtered) = filtered else {
            if from_persistent_cache {
                return Err(HeimdallError::FilteredToNothing);
            }
            warn!(
                resolver = %self.id,
                entity_id = expected_id,
                "metadata filtering produced an empty document, keeping current metadata"
            );
            return Ok(());
        };

        if filtered.trimmed_entity_id() != Some(expected_id) {
            warn!(
                resolver = %self.id,
                expected = expected_id,
                actual = %filtered.entity_id,
                "metadata entity ID does not match expected entity ID, not processing"
            );
            if from_persistent_cache {
                return Err(HeimdallError::EntityIdMismatch {
                    expected: expected_id.to_string(),
                    actual: filtered.entity_id,
                });
            }
            return Ok(());
        }

        let now = Utc::now();
        let expiration = self.policy.expiration(&filtered, now);
        *lifecycle = Lifecycle {
            last_update: Some(now),
            expiration,
            refresh_trigger: self.policy.refresh_trigger(expiration, now),
        };
        debug!(
            resolver = %self.id,
            entity_id = expected_id,
            expiration = %lifecycle.expiration,
            refresh_trigger = %lifecycle.refresh_trigger,
            "computed metadata lifecycle"
        );

        let superseded = self.store.replace(expected_id, filtered);
        let from = if from_persistent_cache { "persistent cache" } else { "origin" };
        info!(resolver = %self.id, entity_id = expected_id, from, "loaded new metadata");

        if let Some(original) = original {
            self.write_through(&original, &superseded);
        }
        self.record_live_entities();
        Ok(())
    }

    /// Save `original` to the persistent cache, dropping the entries of the
    /// descriptors it superseded if they were stored under other keys.
    fn write_through(&self, original: &EntityDescriptor, superseded: &[Arc<EntityDescriptor>]) {
        let Some(cache) = &self.persistent_cache else {
            return;
        };
        let key = (self.key_generator)(original);
        for old in superseded {
            if let Some(old_key) = (self.key_generator)(old).filter(|k| Some(k) != key.as_ref()) {
                self.remove_persisted(cache.as_ref(), &old_key, &old.entity_id);
            }
        }

        let Some(key) = key else {
            warn!(resolver = %self.id, entity_id = %original.entity_id, "no persistent cache key generated, not caching");
            return;
        };
        trace!(resolver = %self.id, entity_id = %original.entity_id, key = %key, "saving metadata to persistent cache");
        if let Err(e) = cache.save(&key, original, true) {
            warn!(
                resolver = %self.id,
                entity_id = %original.entity_id,
                key = %key,
                error = %e,
                "failed to save metadata to persistent cache"
            );
        }
    }

    /// Drop `entity_id` from the backing store and the persistent cache.
    /// Caller holds the entity's write lock.
    pub(crate) fn remove_entity(&self, entity_id: &str) -> Vec<Arc<EntityDescriptor>> {
        let removed = self.store.remove(entity_id);
        if let Some(cache) = &self.persistent_cache {
            for descriptor in &removed {
                if let Some(key) = (self.key_generator)(descriptor) {
                    self.remove_persisted(cache.as_ref(), &key, &descriptor.entity_id);
                }
            }
        }
        removed
    }

    fn remove_persisted(&self, cache: &dyn LoadSaveManager, key: &str, entity_id: &str) {
        if let Err(e) = cache.remove(key) {
            warn!(
                resolver = %self.id,
                entity_id,
                key,
                error = %e,
                "failed to remove metadata from persistent cache"
            );
        }
    }

    pub(crate) fn record_live_entities(&self) {
        metrics::gauge!(telemetry::LIVE_ENTITIES, "resolver" => self.id.clone()).set(self.store.len() as f64);
    }
}
