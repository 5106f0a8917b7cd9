//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use heimdall::criteria::EntityIdCriterion;
use heimdall::persist::{LoadSaveManager, MapLoadSaveManager};
use heimdall::resolver::default_key_generator;
use heimdall::source::{OriginSource, RetryConfig, RetryingOriginSource};
use heimdall::telemetry;
use heimdall::{CriteriaSet, DynamicMetadataResolver, EntityDescriptor, HeimdallError, ResolverConfig, Result};

const IDP: &str = "https://idp.example.org/idp";
const MISSING: &str = "https://missing.example.org";

// ============================================================================
// Mock origins
// ============================================================================

struct StaticOrigin;

#[async_trait]
impl OriginSource for StaticOrigin {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, criteria: &CriteriaSet) -> Result<Option<EntityDescriptor>> {
        Ok(criteria
            .entity_id()
            .filter(|id| *id != MISSING)
            .map(EntityDescriptor::new))
    }
}

struct FlakyOrigin {
    failures_left: AtomicU32,
}

#[async_trait]
impl OriginSource for FlakyOrigin {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn fetch(&self, criteria: &CriteriaSet) -> Result<Option<EntityDescriptor>> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(HeimdallError::Http("connection reset".into()));
        }
        Ok(criteria.entity_id().map(EntityDescriptor::new))
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Counter value for one label value.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, expected: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            key.key()
                .labels()
                .any(|l| l.key() == label && l.value() == expected)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Gauge value for one label value, if recorded.
fn gauge_with_label(snapshot: &SnapshotVec, name: &str, label: &str, expected: &str) -> Option<f64> {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Gauge && key.key().name() == name)
        .find(|(key, _, _, _)| {
            key.key()
                .labels()
                .any(|l| l.key() == label && l.value() == expected)
        })
        .and_then(|(_, _, _, value)| match value {
            DebugValue::Gauge(v) => Some(v.into_inner()),
            _ => None,
        })
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

fn by_id(entity_id: &str) -> CriteriaSet {
    CriteriaSet::new().with(EntityIdCriterion::new(entity_id))
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn resolve_records_request_and_fetch_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let resolver = DynamicMetadataResolver::builder()
                    .origin(Arc::new(StaticOrigin))
                    .build()
                    .await
                    .unwrap();
                resolver.resolve(&by_id(IDP)).await.unwrap();
                resolver.resolve(&by_id(IDP)).await.unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::RESOLVE_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::ORIGIN_FETCH_TOTAL, "status", "ok"),
        1,
        "second resolve should be served from memory"
    );
    assert!(has_histogram(&snapshot, telemetry::RESOLVE_DURATION_SECONDS));
    assert!(has_histogram(&snapshot, telemetry::ORIGIN_FETCH_DURATION_SECONDS));
    assert_eq!(
        gauge_with_label(&snapshot, telemetry::LIVE_ENTITIES, "resolver", "dynamic"),
        Some(1.0)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn fetch_outcomes_are_labelled() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let resolver = DynamicMetadataResolver::builder()
                    .origin(Arc::new(StaticOrigin))
                    .build()
                    .await
                    .unwrap();
                resolver.resolve(&by_id(IDP)).await.unwrap();
                resolver.resolve(&by_id(MISSING)).await.unwrap();
                // Without an entity ID the origin is not consulted
                resolver.resolve(&CriteriaSet::new()).await.unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::RESOLVE_TOTAL), 3);
    assert_eq!(counter_total(&snapshot, telemetry::ORIGIN_FETCH_TOTAL), 2);
    assert_eq!(counter_with_label(&snapshot, telemetry::ORIGIN_FETCH_TOTAL, "status", "ok"), 1);
    assert_eq!(counter_with_label(&snapshot, telemetry::ORIGIN_FETCH_TOTAL, "status", "empty"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn sweep_records_evictions() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let evicted = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let resolver = DynamicMetadataResolver::builder()
                    .origin(Arc::new(StaticOrigin))
                    .config(ResolverConfig::new().remove_idle_entity_data(false))
                    .build()
                    .await
                    .unwrap();
                resolver.resolve(&by_id(IDP)).await.unwrap();
                resolver.sweep_at(Utc::now() + TimeDelta::hours(9)).await
            })
        })
    });
    assert_eq!(evicted, 1);

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with_label(&snapshot, telemetry::EVICTIONS_TOTAL, "reason", "expired"),
        1
    );
    assert_eq!(
        gauge_with_label(&snapshot, telemetry::LIVE_ENTITIES, "resolver", "dynamic"),
        Some(0.0)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn bootstrap_records_entry_outcomes() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let cache = Arc::new(MapLoadSaveManager::new());
    let key = |id: &str| default_key_generator()(&EntityDescriptor::new(id)).unwrap();
    cache.save(&key(IDP), &EntityDescriptor::new(IDP), false).unwrap();
    let expired = EntityDescriptor::new("urn:expired").valid_until(Utc::now() - TimeDelta::hours(1));
    cache.save(&key("urn:expired"), &expired, false).unwrap();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                DynamicMetadataResolver::builder()
                    .id("bootstrap")
                    .origin(Arc::new(StaticOrigin))
                    .persistent_cache(cache)
                    .config(ResolverConfig::new().initialize_from_persistent_cache_in_background(false))
                    .build()
                    .await
                    .unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    let outcome = |name: &str| gauge_with_label(&snapshot, telemetry::PERSISTENT_CACHE_ENTRIES, "outcome", name);
    assert_eq!(outcome("total"), Some(2.0));
    assert_eq!(outcome("loaded"), Some(1.0));
    assert_eq!(outcome("invalid"), Some(1.0));
    assert_eq!(outcome("error"), Some(0.0));
    assert!(
        snapshot
            .iter()
            .any(|(key, _, _, _)| key.key().name() == telemetry::PERSISTENT_CACHE_INIT_SECONDS)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn retries_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let origin = RetryingOriginSource::new(
                    Arc::new(FlakyOrigin {
                        failures_left: AtomicU32::new(2),
                    }),
                    RetryConfig::new()
                        .max_attempts(3)
                        .initial_delay(Duration::from_millis(1)),
                );
                origin.fetch(&by_id(IDP)).await
            })
        })
    });
    assert!(result.unwrap().is_some());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with_label(&snapshot, telemetry::ORIGIN_RETRIES_TOTAL, "source", "flaky"),
        2
    );
}
