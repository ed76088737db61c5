use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::error::ServiceError;
use crate::ttl::TtlClass;

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained request budget per context (default: 100)
    pub requests_per_minute: u32,

    /// Burst capacity per context (default: 10)
    pub burst_capacity: u32,

    /// How long a blocking acquire may wait (default: 30s)
    pub wait_timeout_secs: u64,

    /// React to server-reported quota headers (default: true)
    pub adaptive: bool,

    /// Rate multiplier applied while throttled (default: 0.8)
    pub throttling_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
            burst_capacity: 10,
            wait_timeout_secs: 30,
            adaptive: true,
            throttling_factor: 0.8,
        }
    }
}

impl RateLimitConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Refill rate in permits per second
    pub fn rate_per_second(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(ServiceError::Configuration("requests_per_minute must be greater than 0".to_string()));
        }
        if self.burst_capacity == 0 {
            return Err(ServiceError::Configuration("burst_capacity must be greater than 0".to_string()));
        }
        if !(self.throttling_factor > 0.0 && self.throttling_factor <= 1.0) {
            return Err(ServiceError::Configuration("throttling_factor must be in (0, 1]".to_string()));
        }
        Ok(())
    }
}

/// Retry orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before the recovery path fires (default: 3)
    pub max_attempts: u32,

    /// First backoff delay (default: 500ms)
    pub initial_backoff_ms: u64,

    /// Backoff growth factor (default: 2.0)
    pub backoff_multiplier: f64,

    /// Backoff ceiling (default: 30s)
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 500, backoff_multiplier: 2.0, max_backoff_ms: 30_000 }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ServiceError::Configuration("max_attempts must be greater than 0".to_string()));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ServiceError::Configuration("backoff_multiplier must be at least 1.0".to_string()));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ServiceError::Configuration("max_backoff_ms must not be below initial_backoff_ms".to_string()));
        }
        Ok(())
    }
}

/// Response cache configuration. TTLs are per data stability class.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for weekly roll-ups (default: 1,800,000ms)
    pub ttl_weekly_ms: u64,

    /// TTL for daily summaries (default: 900,000ms)
    pub ttl_daily_ms: u64,

    /// TTL for listings (default: 600,000ms)
    pub ttl_listing_ms: u64,

    /// TTL for live status data (default: 300,000ms)
    pub ttl_live_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_weekly_ms: 1_800_000, ttl_daily_ms: 900_000, ttl_listing_ms: 600_000, ttl_live_ms: 300_000 }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        let millis = match class {
            TtlClass::Weekly => self.ttl_weekly_ms,
            TtlClass::Daily => self.ttl_daily_ms,
            TtlClass::Listing => self.ttl_listing_ms,
            TtlClass::Live => self.ttl_live_ms,
        };
        Duration::from_millis(millis)
    }

    pub fn validate(&self) -> Result<()> {
        for class in TtlClass::ALL {
            if self.ttl_for(class).is_zero() {
                return Err(ServiceError::Configuration(format!("ttl for {} must be greater than 0", class.as_str())));
            }
        }
        Ok(())
    }
}

/// Top-level configuration for the resilience layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl ResilienceConfig {
    pub fn validate(&self) -> Result<()> {
        self.rate_limit.validate()?;
        self.retry.validate()?;
        self.cache.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();

        assert_eq!(config.rate_limit.requests_per_minute, 100);
        assert_eq!(config.rate_limit.burst_capacity, 10);
        assert_eq!(config.rate_limit.wait_timeout(), Duration::from_secs(30));
        assert!(config.rate_limit.adaptive);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.cache.ttl_for(TtlClass::Weekly), Duration::from_millis(1_800_000));
        assert_eq!(config.cache.ttl_for(TtlClass::Live), Duration::from_millis(300_000));

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_per_second() {
        let config = RateLimitConfig { requests_per_minute: 60, ..Default::default() };
        assert!((config.rate_per_second() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_rejects_zero_rate() {
        let config = RateLimitConfig { requests_per_minute: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ServiceError::Configuration(_))));
    }

    #[test]
    fn test_validation_rejects_bad_throttle_factor() {
        let config = RateLimitConfig { throttling_factor: 1.5, ..Default::default() };
        assert!(config.validate().is_err());

        let config = RateLimitConfig { throttling_factor: 0.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let config = RetryConfig { initial_backoff_ms: 5_000, max_backoff_ms: 1_000, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let parsed: ResilienceConfig = toml::from_str(
            r#"
            [rate_limit]
            requests_per_minute = 60
            burst_capacity = 5

            [cache]
            ttl_live_ms = 120000
            "#,
        )
        .unwrap();

        assert_eq!(parsed.rate_limit.requests_per_minute, 60);
        assert_eq!(parsed.rate_limit.burst_capacity, 5);
        // Unspecified fields keep their defaults
        assert_eq!(parsed.rate_limit.wait_timeout_secs, 30);
        assert_eq!(parsed.cache.ttl_for(TtlClass::Live), Duration::from_millis(120_000));
        assert_eq!(parsed.retry.max_attempts, 3);
    }
}
