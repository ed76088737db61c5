use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use pm_types::QuotaHint;
use pm_types::RateLimitConfig;
use pm_types::Result;
use pm_types::ServiceError;
use tracing::debug;
use tracing::warn;

use crate::bucket::TokenBucket;

/// Throttle window used when the server signals pressure without a reset time
const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(60);

/// Read-only snapshot of one context's bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Permits available right now
    pub available_permits: u32,

    /// Bucket capacity
    pub max_permits: u32,

    /// Estimated wait until a single permit becomes available
    pub estimated_wait: Duration,
}

/// Process-wide limiter counters
///
/// Monotonically non-decreasing except on explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterMetrics {
    /// Acquisition requests observed (try and blocking)
    pub total_requests: u64,

    /// Requests denied or timed out
    pub rate_limited_requests: u64,

    /// Total time spent in blocking waits, in milliseconds
    pub total_wait_millis: u64,

    /// Contexts currently registered
    pub active_contexts: usize,
}

impl RateLimiterMetrics {
    /// Share of requests that were rate limited, in percent
    pub fn rate_limited_percent(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        (self.rate_limited_requests as f64 / self.total_requests as f64) * 100.0
    }

    /// Mean blocking wait per request, in milliseconds
    pub fn avg_wait_millis(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_wait_millis as f64 / self.total_requests as f64
    }
}

/// Per-context token bucket registry
///
/// Buckets are created lazily from the default configuration on first use of
/// a context name and live until explicitly evicted. Contexts are fully
/// isolated: exhausting one never blocks another.
pub struct RateLimiter {
    buckets: DashMap<String, Arc<TokenBucket>>,
    defaults: RateLimitConfig,
    total_requests: AtomicU64,
    rate_limited_requests: AtomicU64,
    total_wait_millis: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter from validated defaults
    pub fn new(defaults: RateLimitConfig) -> Result<Self> {
        defaults.validate()?;
        Ok(Self {
            buckets: DashMap::new(),
            defaults,
            total_requests: AtomicU64::new(0),
            rate_limited_requests: AtomicU64::new(0),
            total_wait_millis: AtomicU64::new(0),
        })
    }

    /// Non-blocking acquisition. Returns false when the context's bucket
    /// cannot satisfy the request right now.
    pub fn try_acquire(&self, context: &str, permits: u32) -> bool {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let granted = self.bucket(context).try_acquire(permits);
        if !granted {
            self.rate_limited_requests.fetch_add(1, Ordering::Relaxed);
        }
        granted
    }

    /// Blocking acquisition with a deadline
    ///
    /// Polls the bucket with a bounded exponential sleep. Returns false when
    /// the timeout elapses first. Dropping the future cancels the wait
    /// promptly; waiters are not queued, so ordering across concurrent
    /// acquirers is best-effort rather than first-come-first-served.
    pub async fn acquire(&self, context: &str, permits: u32, timeout: Duration) -> bool {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let bucket = self.bucket(context);
        let start = Instant::now();
        let deadline = start + timeout;
        let mut backoff_micros: u64 = 50;

        loop {
            if bucket.try_acquire(permits) {
                let waited = start.elapsed();
                self.total_wait_millis.fetch_add(waited.as_millis() as u64, Ordering::Relaxed);
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                self.rate_limited_requests.fetch_add(1, Ordering::Relaxed);
                self.total_wait_millis.fetch_add(timeout.as_millis() as u64, Ordering::Relaxed);
                debug!(context, ?timeout, "acquire timed out");
                return false;
            }

            // Exponential poll backoff up to 10ms, clipped to the deadline
            let delay = Duration::from_micros(backoff_micros.min(10_000)).min(deadline - now);
            tokio::time::sleep(delay).await;
            backoff_micros = (backoff_micros * 2).min(10_000);
        }
    }

    /// Read-only status for a context, O(1)
    pub fn status(&self, context: &str) -> RateLimitStatus {
        let bucket = self.bucket(context);
        RateLimitStatus {
            available_permits: bucket.available(),
            max_permits: bucket.capacity(),
            estimated_wait: bucket.estimated_wait(1),
        }
    }

    /// Replace a context's rate and capacity atomically
    ///
    /// In-flight acquisitions observe either the old or the new settings,
    /// never a mix. Any active adaptive throttle is cleared.
    pub fn update_configuration(&self, context: &str, requests_per_minute: u32, burst_capacity: u32) -> Result<()> {
        if requests_per_minute == 0 {
            return Err(ServiceError::Configuration("requests_per_minute must be greater than 0".to_string()));
        }
        if burst_capacity == 0 {
            return Err(ServiceError::Configuration("burst_capacity must be greater than 0".to_string()));
        }

        let rate = f64::from(requests_per_minute) / 60.0;
        self.bucket(context).reconfigure(burst_capacity, rate);
        debug!(context, requests_per_minute, burst_capacity, "rate limit reconfigured");
        Ok(())
    }

    /// Adaptive hook: react to the server's own quota report
    ///
    /// When adaptive limiting is enabled and the hint shows pressure, the
    /// context's effective rate is shrunk by the throttling factor until the
    /// server's reset time (or a default window when it reports none). The
    /// original rate is restored lazily once the deadline passes.
    pub fn adjust_from_server(&self, context: &str, hint: QuotaHint) {
        if !self.defaults.adaptive {
            return;
        }
        if !hint.under_pressure() {
            return;
        }

        let window = hint.reset_in.unwrap_or(DEFAULT_THROTTLE_WINDOW);
        let bucket = self.bucket(context);
        bucket.throttle_for(self.defaults.throttling_factor, window);
        warn!(
            context,
            remaining = ?hint.remaining,
            limit = ?hint.limit,
            window_secs = window.as_secs(),
            factor = self.defaults.throttling_factor,
            "server quota pressure, throttling context"
        );
    }

    /// Current counter snapshot
    pub fn metrics(&self) -> RateLimiterMetrics {
        RateLimiterMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rate_limited_requests: self.rate_limited_requests.load(Ordering::Relaxed),
            total_wait_millis: self.total_wait_millis.load(Ordering::Relaxed),
            active_contexts: self.buckets.len(),
        }
    }

    /// Explicit operator reset of the counters
    pub fn reset_metrics(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.rate_limited_requests.store(0, Ordering::Relaxed);
        self.total_wait_millis.store(0, Ordering::Relaxed);
    }

    /// Remove a context's bucket. Returns whether one existed.
    pub fn evict(&self, context: &str) -> bool {
        self.buckets.remove(context).is_some()
    }

    /// Whether a context is currently under an adaptive throttle
    pub fn is_throttled(&self, context: &str) -> bool {
        self.buckets.get(context).map(|bucket| bucket.is_throttled()).unwrap_or(false)
    }

    /// Whether a context has been used (or configured) yet
    pub fn has_context(&self, context: &str) -> bool {
        self.buckets.contains_key(context)
    }

    /// Bucket for a context, created lazily from the defaults
    fn bucket(&self, context: &str) -> Arc<TokenBucket> {
        if let Some(existing) = self.buckets.get(context) {
            return Arc::clone(existing.value());
        }

        Arc::clone(
            self.buckets
                .entry(context.to_string())
                .or_insert_with(|| {
                    debug!(context, "creating rate limit context");
                    Arc::new(TokenBucket::new(self.defaults.burst_capacity, self.defaults.rate_per_second()))
                })
                .value(),
        )
    }
}
