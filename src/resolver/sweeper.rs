//! Eviction of expired and idle entities.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use super::dynamic::ResolverInner;
use crate::telemetry;

impl ResolverInner {
    /// Evict every tracked entity that expired before `now`, or, with idle
    /// removal enabled, was last accessed more than `max_idle_entity_data`
    /// before `now`. Returns the number of entities whose metadata was
    /// evicted.
    ///
    /// Each entity is examined under its own write lock, so resolves of
    /// other entities proceed concurrently.
    pub(crate) async fn sweep(&self, now: DateTime<Utc>) -> usize {
        if self.is_destroyed() {
            debug!(resolver = %self.id, "resolver is shut down, skipping cleanup sweep");
            return 0;
        }

        let max_idle = i64::try_from(self.config.max_idle_entity_data_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let earliest_valid_access = now.checked_sub_signed(max_idle).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let trackers = self.management.snapshot();
        trace!(resolver = %self.id, tracked = trackers.len(), "starting cleanup sweep");

        let mut evicted = 0;
        for tracker in trackers {
            if self.is_destroyed() {
                break;
            }
            let lifecycle = tracker.write().await;
            if tracker.is_retired() {
                continue;
            }

            let reason = if self.config.remove_idle_entity_data && tracker.last_accessed() < earliest_valid_access {
                "idle"
            } else if now > lifecycle.expiration {
                "expired"
            } else {
                continue;
            };

            let removed = self.remove_entity(tracker.entity_id());
            tracker.retire();
            self.management.remove_if_same(&tracker);
            drop(lifecycle);

            if removed.is_empty() {
                trace!(resolver = %self.id, entity_id = tracker.entity_id(), reason, "dropped tracker without metadata");
                continue;
            }
            debug!(resolver = %self.id, entity_id = tracker.entity_id(), reason, "evicted entity metadata");
            metrics::counter!(telemetry::EVICTIONS_TOTAL,
                "resolver" => self.id.clone(),
                "reason" => reason,
            )
            .increment(1);
            evicted += 1;
        }

        self.record_live_entities();
        debug!(resolver = %self.id, evicted, "cleanup sweep finished");
        evicted
    }
}
