//! Per-entity lifecycle tracking.
//!
//! Every entity ID the resolver has been asked about gets one
//! [`EntityManagementData`]: its timestamps and a fair reader/writer lock
//! serialising all mutation of that entity's cached document. The table
//! itself takes its write lock only to insert a missing tracker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

/// Timestamps guarded by an entity's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    /// When the cached document was last replaced. `None` until first fetch.
    pub last_update: Option<DateTime<Utc>>,
    pub expiration: DateTime<Utc>,
    pub refresh_trigger: DateTime<Utc>,
}

/// Lifecycle state and lock for one entity ID.
#[derive(Debug)]
pub struct EntityManagementData {
    entity_id: String,
    last_accessed_ms: AtomicI64,
    retired: AtomicBool,
    lifecycle: Arc<tokio::sync::RwLock<Lifecycle>>,
}

impl EntityManagementData {
    fn new(entity_id: String, now: DateTime<Utc>, default_lifetime: TimeDelta) -> Self {
        let expiration = now + default_lifetime;
        Self {
            entity_id,
            last_accessed_ms: AtomicI64::new(now.timestamp_millis()),
            retired: AtomicBool::new(false),
            lifecycle: Arc::new(tokio::sync::RwLock::new(Lifecycle {
                last_update: None,
                expiration,
                refresh_trigger: expiration,
            })),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Record an access. Never moves the timestamp backwards.
    pub fn touch(&self, now: DateTime<Utc>) {
        self.last_accessed_ms.fetch_max(now.timestamp_millis(), Ordering::AcqRel);
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_accessed_ms.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Whether the tracker has been evicted from its table. A caller that
    /// acquires the lock of a retired tracker must look it up again.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Mark evicted. Call while holding the write lock.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub async fn read(&self) -> OwnedRwLockReadGuard<Lifecycle> {
        Arc::clone(&self.lifecycle).read_owned().await
    }

    pub async fn write(&self) -> OwnedRwLockWriteGuard<Lifecycle> {
        Arc::clone(&self.lifecycle).write_owned().await
    }

    /// Current timestamps, waiting for any writer to finish.
    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read().await
    }
}

/// Entity ID → tracker table.
#[derive(Debug)]
pub struct ManagementTable {
    trackers: RwLock<HashMap<String, Arc<EntityManagementData>>>,
    default_lifetime: TimeDelta,
}

impl ManagementTable {
    /// New trackers start with expiration and refresh trigger at
    /// `now + default_lifetime`.
    pub fn new(default_lifetime: TimeDelta) -> Self {
        Self {
            trackers: RwLock::new(HashMap::new()),
            default_lifetime,
        }
    }

    /// The tracker for `entity_id`, creating it if absent.
    pub fn get_or_create(&self, entity_id: &str, now: DateTime<Utc>) -> Arc<EntityManagementData> {
        if let Some(tracker) = self.trackers.read().get(entity_id) {
            return Arc::clone(tracker);
        }
        let mut trackers = self.trackers.write();
        // Another caller may have inserted while we waited for the write lock
        Arc::clone(trackers.entry(entity_id.to_string()).or_insert_with(|| {
            Arc::new(EntityManagementData::new(
                entity_id.to_string(),
                now,
                self.default_lifetime,
            ))
        }))
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityManagementData>> {
        self.trackers.read().get(entity_id).cloned()
    }

    /// All trackers at this instant.
    pub fn snapshot(&self) -> Vec<Arc<EntityManagementData>> {
        self.trackers.read().values().cloned().collect()
    }

    /// Remove `tracker` if it is still the one registered for its entity ID.
    pub fn remove_if_same(&self, tracker: &Arc<EntityManagementData>) -> bool {
        let mut trackers = self.trackers.write();
        match trackers.get(tracker.entity_id()) {
            Some(current) if Arc::ptr_eq(current, tracker) => {
                trackers.remove(tracker.entity_id());
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.trackers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.read().is_empty()
    }

    pub fn clear(&self) {
        self.trackers.write().clear();
    }
}
