use std::future::Future;
use std::time::Duration;

use pm_cache::CacheStats;
use pm_cache::ResponseCache;
use pm_ratelimit::RateLimitStatus;
use pm_ratelimit::RateLimiter;
use pm_ratelimit::RateLimiterMetrics;
use pm_retry::RetryOrchestrator;
use pm_retry::RetryOutcome;
use pm_types::DegradedReport;
use pm_types::QuotaHint;
use pm_types::Report;
use pm_types::ResilienceConfig;
use pm_types::Result;
use pm_types::ServiceError;
use pm_types::TtlClass;
use tracing::debug;
use tracing::warn;

/// What the remote-call collaborator returns on success
///
/// The quota hint carries the server's own rate-limit report, when present,
/// so the invoker can feed it back into the adaptive limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome<V> {
    pub value: V,
    pub quota: Option<QuotaHint>,
}

impl<V> FetchOutcome<V> {
    pub fn new(value: V) -> Self {
        Self { value, quota: None }
    }

    pub fn with_quota(value: V, quota: QuotaHint) -> Self {
        Self { value, quota: Some(quota) }
    }
}

/// Façade composing cache, rate limiter and retry orchestrator around an
/// opaque remote call
///
/// Per invocation: cache lookup, permit acquisition with the configured wait
/// timeout, orchestrated call, quota feedback, cache store. The collaborator
/// must not retry internally; all retry policy lives here. A permit that
/// cannot be acquired in time surfaces to the orchestrator as a rate-limit
/// failure, exactly as if the remote service had refused the call.
pub struct ResilientInvoker<V> {
    limiter: RateLimiter,
    cache: ResponseCache<V>,
    orchestrator: RetryOrchestrator,
    recovery: Box<dyn Fn(&ServiceError, u32) -> V + Send + Sync>,
    wait_timeout: Duration,
}

impl<V: Clone> ResilientInvoker<V> {
    /// Build the full stack from one validated configuration
    ///
    /// `recovery` produces the degraded fallback after retry exhaustion; it
    /// must be cheap and must not perform remote calls.
    pub fn new<R>(config: ResilienceConfig, recovery: R) -> Result<Self>
    where
        R: Fn(&ServiceError, u32) -> V + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            limiter: RateLimiter::new(config.rate_limit.clone())?,
            cache: ResponseCache::new(config.cache.clone())?,
            orchestrator: RetryOrchestrator::new(config.retry.clone())?,
            recovery: Box::new(recovery),
            wait_timeout: config.rate_limit.wait_timeout(),
        })
    }

    /// Retrieve a report through the full resilience pipeline
    ///
    /// `call` is invoked once per attempt. Returns the cached value on a
    /// hit, a fresh value on success, or a marked degraded value after
    /// retryable exhaustion; only permanent and configuration failures
    /// surface as errors.
    pub async fn invoke<F, Fut>(&self, context: &str, cache_key: &str, class: TtlClass, call: F) -> Result<Report<V>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<FetchOutcome<V>>>,
    {
        if let Some(value) = self.cache.get(cache_key) {
            debug!(context, cache_key, "cache hit");
            return Ok(Report::Cached(value));
        }

        let outcome = self
            .orchestrator
            .execute(
                |_attempt| {
                    let fetch = call();
                    async move {
                        if !self.limiter.acquire(context, 1, self.wait_timeout).await {
                            return Err(ServiceError::rate_limited());
                        }
                        fetch.await
                    }
                },
                |error, attempts| FetchOutcome::new((self.recovery)(error, attempts)),
            )
            .await?;

        match outcome {
            RetryOutcome::Completed { value: fetched, attempts } => {
                if let Some(hint) = fetched.quota {
                    self.limiter.adjust_from_server(context, hint);
                }
                self.cache.insert(cache_key, class, fetched.value.clone());
                debug!(context, cache_key, attempts, "report retrieved");
                Ok(Report::Fresh(fetched.value))
            }
            RetryOutcome::Degraded(degraded) => {
                warn!(context, cache_key, attempts = degraded.attempts, reason = %degraded.reason, "serving degraded report");
                Ok(Report::Degraded(DegradedReport {
                    value: degraded.value.value,
                    reason: degraded.reason,
                    attempts: degraded.attempts,
                }))
            }
        }
    }

    // Operational pass-throughs

    pub fn try_acquire(&self, context: &str, permits: u32) -> bool {
        self.limiter.try_acquire(context, permits)
    }

    pub async fn acquire(&self, context: &str, permits: u32, timeout: Duration) -> bool {
        self.limiter.acquire(context, permits, timeout).await
    }

    pub fn status(&self, context: &str) -> RateLimitStatus {
        self.limiter.status(context)
    }

    pub fn metrics(&self) -> RateLimiterMetrics {
        self.limiter.metrics()
    }

    pub fn update_configuration(&self, context: &str, requests_per_minute: u32, burst_capacity: u32) -> Result<()> {
        self.limiter.update_configuration(context, requests_per_minute, burst_capacity)
    }

    pub fn is_throttled(&self, context: &str) -> bool {
        self.limiter.is_throttled(context)
    }

    pub fn evict_context(&self, context: &str) -> bool {
        self.limiter.evict(context)
    }

    pub fn evict(&self, cache_key: &str) -> bool {
        self.cache.evict(cache_key)
    }

    pub fn evict_prefix(&self, prefix: &str) -> usize {
        self.cache.evict_prefix(prefix)
    }

    pub fn clear(&self) {
        self.cache.clear()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
