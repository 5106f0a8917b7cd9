//! Expiration and refresh-trigger computation.

use chrono::{DateTime, TimeDelta, Utc};

use super::config::ResolverConfig;
use crate::types::EntityDescriptor;
use crate::{HeimdallError, Result};

/// Computes when a cached document expires and when it should be refreshed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpirationPolicy {
    min_cache_duration: TimeDelta,
    max_cache_duration: TimeDelta,
    refresh_delay_factor: f32,
}

impl ExpirationPolicy {
    /// Fails if `refresh_delay_factor` is outside `(0, 1)` or `min > max`.
    pub fn new(min_cache_duration: TimeDelta, max_cache_duration: TimeDelta, refresh_delay_factor: f32) -> Result<Self> {
        if !(refresh_delay_factor > 0.0 && refresh_delay_factor < 1.0) {
            return Err(HeimdallError::Configuration(format!(
                "refresh_delay_factor must be between 0 and 1 exclusive, got {refresh_delay_factor}"
            )));
        }
        if min_cache_duration < TimeDelta::zero() || min_cache_duration > max_cache_duration {
            return Err(HeimdallError::Configuration(
                "cache durations must satisfy 0 <= min <= max".into(),
            ));
        }
        Ok(Self {
            min_cache_duration,
            max_cache_duration,
            refresh_delay_factor,
        })
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            secs(config.min_cache_duration_secs)?,
            secs(config.max_cache_duration_secs)?,
            config.refresh_delay_factor,
        )
    }

    pub fn min_cache_duration(&self) -> TimeDelta {
        self.min_cache_duration
    }

    pub fn max_cache_duration(&self) -> TimeDelta {
        self.max_cache_duration
    }

    /// The document's earliest declared expiration, capped at
    /// `now + max_cache_duration` and floored at `now + min_cache_duration`.
    pub fn expiration(&self, descriptor: &EntityDescriptor, now: DateTime<Utc>) -> DateTime<Utc> {
        let upper = now + self.max_cache_duration;
        descriptor
            .earliest_expiration(upper, now)
            .max(now + self.min_cache_duration)
    }

    /// `now + max(min_cache_duration, (expiration - now) * factor)`.
    pub fn refresh_trigger(&self, expiration: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let remaining_ms = (expiration - now).num_milliseconds();
        let scaled_ms = (remaining_ms as f64 * f64::from(self.refresh_delay_factor)).round() as i64;
        let delay = TimeDelta::milliseconds(scaled_ms).max(self.min_cache_duration);
        now + delay
    }

    pub fn should_refresh(refresh_trigger: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now > refresh_trigger
    }
}

fn secs(value: u64) -> Result<TimeDelta> {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| HeimdallError::Configuration(format!("duration of {value} seconds is out of range")))
}
