use std::future::Future;
use std::time::Duration;

use pm_types::DegradedReport;
use pm_types::Result;
use pm_types::RetryConfig;
use pm_types::ServiceError;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

/// How a retried operation ended
///
/// Retryable exhaustion never surfaces as an error; the recovery path turns
/// it into a clearly-marked degraded value so callers always receive
/// something usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The operation produced a value, possibly after retries
    Completed { value: T, attempts: u32 },

    /// Retries were exhausted and the recovery path produced a fallback
    Degraded(DegradedReport<T>),
}

impl<T> RetryOutcome<T> {
    pub fn into_value(self) -> T {
        match self {
            RetryOutcome::Completed { value, .. } => value,
            RetryOutcome::Degraded(degraded) => degraded.value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RetryOutcome::Degraded(_))
    }
}

/// Drives bounded retries with exponential backoff and graceful degradation
///
/// Errors are classified through the shared taxonomy: rate-limit, transient
/// and connection failures are retried with capped exponential backoff
/// (preferring a longer server-suggested wait when one is carried by the
/// error); permanent and configuration failures propagate immediately.
pub struct RetryOrchestrator {
    config: RetryConfig,
}

impl RetryOrchestrator {
    /// Create an orchestrator from validated settings
    pub fn new(config: RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Backoff before the attempt following `attempt` (1-based)
    ///
    /// `initial * multiplier^(attempt - 1)`, capped at the configured
    /// maximum. Non-decreasing in the attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = self.config.backoff_multiplier.powi(exponent as i32);
        let millis = (self.config.initial_backoff_ms as f64 * factor).min(self.config.max_backoff_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Configured attempt bound
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Run `op` until it succeeds, exhausts its attempts, or fails permanently
    ///
    /// `op` receives the 1-based attempt number. On exhaustion, `recover` is
    /// invoked with the last error and the attempt count to build the
    /// degraded fallback; it must not perform remote calls. The backoff
    /// sleep is the only suspension point and is cancelled by dropping the
    /// returned future.
    pub async fn execute<T, F, Fut, R>(&self, mut op: F, recover: R) -> Result<RetryOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnOnce(&ServiceError, u32) -> T,
    {
        let mut attempt: u32 = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "call succeeded after retries");
                    }
                    return Ok(RetryOutcome::Completed { value, attempts: attempt });
                }
                Err(error) if !error.is_retryable() => {
                    debug!(attempt, %error, "non-retryable failure, propagating");
                    return Err(error);
                }
                Err(error) => {
                    if attempt >= self.config.max_attempts {
                        warn!(attempts = attempt, %error, "retries exhausted, recovering with degraded result");
                        let value = recover(&error, attempt);
                        return Ok(RetryOutcome::Degraded(DegradedReport {
                            value,
                            reason: error.to_string(),
                            attempts: attempt,
                        }));
                    }

                    let delay = self.next_delay(attempt, &error);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retryable failure, backing off");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Computed backoff, overridden by a longer server-suggested wait
    fn next_delay(&self, attempt: u32, error: &ServiceError) -> Duration {
        let computed = self.delay_for_attempt(attempt);
        match error.suggested_wait() {
            Some(hint) if hint > computed => hint.min(self.config.max_backoff()),
            _ => computed,
        }
    }
}
