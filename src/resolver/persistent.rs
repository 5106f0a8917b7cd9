//! Bootstrap from the persistent cache.
//!
//! At startup the resolver can reload what it fetched in a previous run.
//! Each stored entry is checked against the validity predicate (invalid
//! entries are deleted), then against the load predicate (entries failing
//! it stay in the store but are not loaded), then goes through the same
//! filter-and-store path as a fresh fetch. Entries stored under a key the
//! current key generator would not produce are renamed.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, trace, warn};

use super::dynamic::ResolverInner;
use super::management::Lifecycle;
use crate::persist::LoadSaveManager;
use crate::source::EntityIdDigestGenerator;
use crate::telemetry;
use crate::types::EntityDescriptor;

/// Derives the persistent cache key for a descriptor. `None` skips caching.
pub type PersistentCacheKeyGenerator = Arc<dyn Fn(&EntityDescriptor) -> Option<String> + Send + Sync>;

/// A yes/no decision about a descriptor.
pub type DescriptorPredicate = Arc<dyn Fn(&EntityDescriptor) -> bool + Send + Sync>;

/// Lower-hex SHA-1 of the trimmed entity ID.
pub fn default_key_generator() -> PersistentCacheKeyGenerator {
    let generator = EntityIdDigestGenerator::new();
    Arc::new(move |descriptor: &EntityDescriptor| generator.generate(&descriptor.entity_id))
}

/// Accepts descriptors whose `valid_until` bounds have not passed.
pub fn default_validity_predicate() -> DescriptorPredicate {
    Arc::new(|descriptor: &EntityDescriptor| descriptor.is_valid(Utc::now()))
}

/// Counters from one persistent cache bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistentCacheInitMetrics {
    /// Whether a persistent cache is configured.
    pub enabled: bool,
    /// Entries read from the store.
    pub total: u64,
    pub loaded: u64,
    /// Entity was already resolved by the time its entry was reached.
    pub skipped_already_live: u64,
    /// Entry failed the validity predicate and was deleted.
    pub skipped_invalid: u64,
    /// Entry failed the load predicate and was left in place.
    pub skipped_failed_predicate: u64,
    /// Entry could not be processed (filter failure, entity ID mismatch).
    pub skipped_exception: u64,
    pub processing_time: Duration,
}

impl fmt::Display for PersistentCacheInitMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enabled={} total={} loaded={} already_live={} invalid={} failed_predicate={} error={} time={:?}",
            self.enabled,
            self.total,
            self.loaded,
            self.skipped_already_live,
            self.skipped_invalid,
            self.skipped_failed_predicate,
            self.skipped_exception,
            self.processing_time
        )
    }
}

impl PersistentCacheInitMetrics {
    fn record(&self, resolver: &str) {
        let outcomes = [
            ("total", self.total),
            ("loaded", self.loaded),
            ("already_live", self.skipped_already_live),
            ("invalid", self.skipped_invalid),
            ("failed_predicate", self.skipped_failed_predicate),
            ("error", self.skipped_exception),
        ];
        for (outcome, count) in outcomes {
            metrics::gauge!(telemetry::PERSISTENT_CACHE_ENTRIES,
                "resolver" => resolver.to_owned(),
                "outcome" => outcome,
            )
            .set(count as f64);
        }
        metrics::gauge!(telemetry::PERSISTENT_CACHE_INIT_SECONDS, "resolver" => resolver.to_owned())
            .set(self.processing_time.as_secs_f64());
    }
}

impl ResolverInner {
    /// Load every not-yet-live entry of the persistent cache.
    pub(crate) async fn initialize_from_persistent_cache(&self) -> PersistentCacheInitMetrics {
        let Some(cache) = &self.persistent_cache else {
            trace!(resolver = %self.id, "persistent caching not enabled, skipping init from cache");
            return PersistentCacheInitMetrics::default();
        };
        trace!(resolver = %self.id, "loading entities from the persistent cache");

        let started = Instant::now();
        let mut metrics = PersistentCacheInitMetrics {
            enabled: true,
            ..Default::default()
        };

        match cache.list_all() {
            Ok(entries) => {
                for (key, descriptor) in entries {
                    if self.is_destroyed() {
                        break;
                    }
                    metrics.total += 1;
                    trace!(
                        resolver = %self.id,
                        entity_id = %descriptor.entity_id,
                        key = %key,
                        "loaded entry from persistent cache"
                    );
                    self.bootstrap_entry(cache.as_ref(), &key, descriptor, &mut metrics).await;
                }
            }
            Err(e) => warn!(resolver = %self.id, error = %e, "failed to list persistent cache entries"),
        }

        metrics.processing_time = started.elapsed();
        debug!(resolver = %self.id, metrics = %metrics, "persistent cache initialization finished");
        metrics.record(&self.id);
        self.record_live_entities();
        *self.init_metrics.lock() = metrics.clone();
        metrics
    }

    async fn bootstrap_entry(
        &self,
        cache: &dyn LoadSaveManager,
        key: &str,
        descriptor: EntityDescriptor,
        metrics: &mut PersistentCacheInitMetrics,
    ) {
        let Some(entity_id) = descriptor.trimmed_entity_id().map(str::to_owned) else {
            warn!(resolver = %self.id, key, "persistent cache entry has no entity ID, skipping");
            metrics.skipped_exception += 1;
            return;
        };

        loop {
            let tracker = self.management.get_or_create(&entity_id, Utc::now());
            let mut lifecycle = tracker.write().await;
            if tracker.is_retired() {
                continue;
            }
            // A resolve may have beaten a background bootstrap to this entity
            if self.store.contains(&entity_id) {
                trace!(resolver = %self.id, entity_id = %entity_id, "entity already live, ignoring cached entry");
                metrics.skipped_already_live += 1;
                return;
            }
            self.process_cache_entry(cache, key, descriptor, &entity_id, &mut lifecycle, metrics);
            return;
        }
    }

    /// Caller holds the entity's write lock.
    fn process_cache_entry(
        &self,
        cache: &dyn LoadSaveManager,
        key: &str,
        descriptor: EntityDescriptor,
        entity_id: &str,
        lifecycle: &mut Lifecycle,
        metrics: &mut PersistentCacheInitMetrics,
    ) {
        if !(self.validity)(&descriptor) {
            trace!(resolver = %self.id, entity_id, key, "cached entry is not valid, removing");
            metrics.skipped_invalid += 1;
            if let Err(e) = cache.remove(key) {
                warn!(resolver = %self.id, entity_id, key, error = %e, "failed to remove invalid cached entry");
            }
            return;
        }

        let expected_key = (self.key_generator)(&descriptor);

        if (self.init_predicate)(&descriptor) {
            match self.process_new_metadata(descriptor, entity_id, lifecycle, true) {
                Ok(()) => {
                    trace!(resolver = %self.id, entity_id, "loaded entity from persistent cache");
                    metrics.loaded += 1;
                }
                Err(e) => {
                    warn!(
                        resolver = %self.id,
                        entity_id,
                        key,
                        error = %e,
                        "failed to process persistent cache entry"
                    );
                    metrics.skipped_exception += 1;
                }
            }
        } else {
            trace!(resolver = %self.id, entity_id, key, "load predicate rejected cached entry");
            metrics.skipped_failed_predicate += 1;
        }

        let Some(expected_key) = expected_key else {
            return;
        };
        if expected_key == key {
            return;
        }
        trace!(resolver = %self.id, current = key, expected = %expected_key, "updating persistent cache key");
        match cache.update_key(key, &expected_key) {
            Ok(true) => trace!(resolver = %self.id, current = key, expected = %expected_key, "updated cache key"),
            Ok(false) => warn!(
                resolver = %self.id,
                current = key,
                expected = %expected_key,
                "cached entry disappeared before its key could be updated"
            ),
            Err(e) => warn!(
                resolver = %self.id,
                current = key,
                expected = %expected_key,
                error = %e,
                "failed to update persistent cache key"
            ),
        }
    }
}
