//! Resolver configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::{HeimdallError, Result};

/// Longest duration any setting may take (100 years).
const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

/// Caching, refresh and cleanup settings for a [`DynamicMetadataResolver`](super::DynamicMetadataResolver).
///
/// Durations are kept in whole seconds. The `Duration` setters round a
/// fractional second up, so a non-zero duration never becomes zero.
///
/// ```rust
/// # use heimdall::ResolverConfig;
/// # use std::time::Duration;
/// let config = ResolverConfig::new()
///     .max_cache_duration(Duration::from_secs(4 * 3600))
///     .refresh_delay_factor(0.5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolverConfig {
    /// Lower bound on how long a document is cached. Default: 10 minutes.
    #[serde(default = "default_min_cache_duration")]
    pub min_cache_duration_secs: u64,
    /// Upper bound on how long a document is cached. Default: 8 hours.
    #[serde(default = "default_max_cache_duration")]
    pub max_cache_duration_secs: u64,
    /// Fraction of the remaining lifetime after which a refresh is
    /// attempted. Must lie in `(0, 1)`. Default: 0.75.
    #[serde(default = "default_refresh_delay_factor")]
    pub refresh_delay_factor: f32,
    /// Entities not accessed for this long are idle. Default: 8 hours.
    #[serde(default = "default_max_idle")]
    pub max_idle_entity_data_secs: u64,
    /// Whether the sweeper evicts idle entities. Default: true.
    #[serde(default = "default_true")]
    pub remove_idle_entity_data: bool,
    /// Sweeper period. Default: 30 minutes.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_task_interval_secs: u64,
    /// Delay before the first sweep. Default: 1 minute.
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_task_delay_secs: u64,
    /// Bootstrap from the persistent cache on a background task instead of
    /// during `build()`. Default: true.
    #[serde(default = "default_true")]
    pub initialize_from_persistent_cache_in_background: bool,
    /// Delay before the background bootstrap. Default: 2 seconds.
    #[serde(default = "default_background_init_delay")]
    pub background_init_from_cache_delay_secs: u64,
    /// When no index understands a query without an entity ID, filter every
    /// live descriptor by the query's predicates instead of returning
    /// nothing. Default: false.
    #[serde(default)]
    pub resolve_via_predicates_only: bool,
}

/// `duration` in whole seconds, rounding any fraction up.
fn whole_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
}

fn default_min_cache_duration() -> u64 {
    10 * 60
}

fn default_max_cache_duration() -> u64 {
    8 * 3600
}

fn default_refresh_delay_factor() -> f32 {
    0.75
}

fn default_max_idle() -> u64 {
    8 * 3600
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    30 * 60
}

fn default_cleanup_delay() -> u64 {
    60
}

fn default_background_init_delay() -> u64 {
    2
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_cache_duration_secs: default_min_cache_duration(),
            max_cache_duration_secs: default_max_cache_duration(),
            refresh_delay_factor: default_refresh_delay_factor(),
            max_idle_entity_data_secs: default_max_idle(),
            remove_idle_entity_data: true,
            cleanup_task_interval_secs: default_cleanup_interval(),
            cleanup_task_delay_secs: default_cleanup_delay(),
            initialize_from_persistent_cache_in_background: true,
            background_init_from_cache_delay_secs: default_background_init_delay(),
            resolve_via_predicates_only: false,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_cache_duration(mut self, duration: Duration) -> Self {
        self.min_cache_duration_secs = whole_secs(duration);
        self
    }

    pub fn max_cache_duration(mut self, duration: Duration) -> Self {
        self.max_cache_duration_secs = whole_secs(duration);
        self
    }

    pub fn refresh_delay_factor(mut self, factor: f32) -> Self {
        self.refresh_delay_factor = factor;
        self
    }

    pub fn max_idle_entity_data(mut self, duration: Duration) -> Self {
        self.max_idle_entity_data_secs = whole_secs(duration);
        self
    }

    pub fn remove_idle_entity_data(mut self, enabled: bool) -> Self {
        self.remove_idle_entity_data = enabled;
        self
    }

    pub fn cleanup_task_interval(mut self, interval: Duration) -> Self {
        self.cleanup_task_interval_secs = whole_secs(interval);
        self
    }

    pub fn cleanup_task_delay(mut self, delay: Duration) -> Self {
        self.cleanup_task_delay_secs = whole_secs(delay);
        self
    }

    pub fn initialize_from_persistent_cache_in_background(mut self, background: bool) -> Self {
        self.initialize_from_persistent_cache_in_background = background;
        self
    }

    pub fn background_init_from_cache_delay(mut self, delay: Duration) -> Self {
        self.background_init_from_cache_delay_secs = whole_secs(delay);
        self
    }

    pub fn resolve_via_predicates_only(mut self, enabled: bool) -> Self {
        self.resolve_via_predicates_only = enabled;
        self
    }

    /// Reject settings the resolver cannot run with.
    pub fn validate(&self) -> Result<()> {
        let factor = self.refresh_delay_factor;
        if !(factor > 0.0 && factor < 1.0) {
            return Err(HeimdallError::Configuration(format!(
                "refresh_delay_factor must be between 0 and 1 exclusive, got {factor}"
            )));
        }

        let required = [
            ("min_cache_duration_secs", self.min_cache_duration_secs),
            ("max_cache_duration_secs", self.max_cache_duration_secs),
            ("max_idle_entity_data_secs", self.max_idle_entity_data_secs),
            ("cleanup_task_interval_secs", self.cleanup_task_interval_secs),
        ];
        for (name, secs) in required {
            if secs == 0 {
                return Err(HeimdallError::Configuration(format!("{name} must be greater than zero")));
            }
        }

        let all = [
            ("min_cache_duration_secs", self.min_cache_duration_secs),
            ("max_cache_duration_secs", self.max_cache_duration_secs),
            ("max_idle_entity_data_secs", self.max_idle_entity_data_secs),
            ("cleanup_task_interval_secs", self.cleanup_task_interval_secs),
            ("cleanup_task_delay_secs", self.cleanup_task_delay_secs),
            ("background_init_from_cache_delay_secs", self.background_init_from_cache_delay_secs),
        ];
        for (name, secs) in all {
            if secs > MAX_DURATION_SECS {
                return Err(HeimdallError::Configuration(format!(
                    "{name} must not exceed {MAX_DURATION_SECS} seconds"
                )));
            }
        }

        if self.min_cache_duration_secs > self.max_cache_duration_secs {
            return Err(HeimdallError::Configuration(format!(
                "min_cache_duration_secs ({}) exceeds max_cache_duration_secs ({})",
                self.min_cache_duration_secs, self.max_cache_duration_secs
            )));
        }
        Ok(())
    }
}
