//! Telemetry metric name constants.
//!
//! Centralised metric names for resolver operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `resolver`: the resolver's configured ID
//! - `status`: outcome: "ok", "empty" or "error"
//! - `reason`: eviction cause: "expired" or "idle"

/// Total `resolve` calls.
///
/// Labels: `resolver`.
pub const RESOLVE_TOTAL: &str = "heimdall_resolve_total";

/// `resolve` duration in seconds.
///
/// Labels: `resolver`.
pub const RESOLVE_DURATION_SECONDS: &str = "heimdall_resolve_duration_seconds";

/// Total fetches from the origin source.
///
/// Labels: `resolver`, `status` ("ok" | "empty" | "error").
pub const ORIGIN_FETCH_TOTAL: &str = "heimdall_origin_fetch_total";

/// Origin fetch duration in seconds.
///
/// Labels: `resolver`.
pub const ORIGIN_FETCH_DURATION_SECONDS: &str = "heimdall_origin_fetch_duration_seconds";

/// Number of entity IDs with live metadata in the backing store.
///
/// Labels: `resolver`.
pub const LIVE_ENTITIES: &str = "heimdall_live_entities";

/// Total entities evicted by the cleanup sweeper.
///
/// Labels: `resolver`, `reason` ("expired" | "idle").
pub const EVICTIONS_TOTAL: &str = "heimdall_evictions_total";

/// Persistent cache bootstrap entry counts from the last run.
///
/// Labels: `resolver`, `outcome` ("total" | "loaded" | "already_live" |
/// "invalid" | "failed_predicate" | "error").
pub const PERSISTENT_CACHE_ENTRIES: &str = "heimdall_persistent_cache_entries";

/// Wall-clock time of the last persistent cache bootstrap, in seconds.
///
/// Labels: `resolver`.
pub const PERSISTENT_CACHE_INIT_SECONDS: &str = "heimdall_persistent_cache_init_seconds";

/// Total retries of origin fetches after transient errors.
///
/// Labels: `source`.
pub const ORIGIN_RETRIES_TOTAL: &str = "heimdall_origin_retries_total";
