use std::time::Duration;

use thiserror::Error;

/// Result type shared by the resilience crates
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Classified failures reported by the remote project-management service
///
/// The transport adapter (or any other collaborator) maps raw failures into
/// this taxonomy before they reach the retry orchestrator. Only `Permanent`
/// and `Configuration` ever cross the façade as errors; everything else is
/// retried or degraded.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// Local or remote rate limit hit. Carries whatever quota details the
    /// server reported so backoff can honor a suggested wait.
    #[error("rate limit exceeded (remaining: {remaining:?}, limit: {limit:?})")]
    RateLimited {
        retry_after: Option<Duration>,
        reset_in: Option<Duration>,
        remaining: Option<u32>,
        limit: Option<u32>,
    },

    /// 5xx-class failure; retryable with backoff
    #[error("transient service error: status {status}")]
    Transient { status: u16 },

    /// 4xx-class failure other than rate limiting; never retried
    #[error("permanent service error: status {status}")]
    Permanent { status: u16 },

    /// Network-level failure (connect, DNS, timeout); retryable
    #[error("connection error: {0}")]
    Connection(String),

    /// Invalid limiter/cache/retry settings; fails fast at setup
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl ServiceError {
    /// Rate limit error with no server-reported details (local exhaustion)
    pub fn rate_limited() -> Self {
        ServiceError::RateLimited { retry_after: None, reset_in: None, remaining: None, limit: None }
    }

    /// Whether the retry orchestrator may schedule another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::RateLimited { .. } => true,
            ServiceError::Transient { .. } => true,
            ServiceError::Connection(_) => true,
            ServiceError::Permanent { .. } => false,
            ServiceError::Configuration(_) => false,
        }
    }

    /// Server-suggested wait before the next attempt, if the error carries one
    pub fn suggested_wait(&self) -> Option<Duration> {
        match self {
            ServiceError::RateLimited { retry_after, reset_in, .. } => (*retry_after).or(*reset_in),
            _ => None,
        }
    }

    /// Quota details embedded in a rate-limit error, for adaptive throttling
    pub fn quota_hint(&self) -> Option<QuotaHint> {
        match self {
            ServiceError::RateLimited { reset_in, remaining, limit, .. } => {
                Some(QuotaHint { remaining: *remaining, limit: *limit, reset_in: *reset_in })
            }
            _ => None,
        }
    }
}

/// Quota state reported by the remote service alongside a response
///
/// Extracted from rate-limit headers on both successful and throttled
/// responses. Fed into the rate limiter's adaptive adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaHint {
    /// Requests remaining in the server's current window
    pub remaining: Option<u32>,

    /// The server's window limit
    pub limit: Option<u32>,

    /// Time until the server's window resets
    pub reset_in: Option<Duration>,
}

impl QuotaHint {
    /// Whether the hint signals quota pressure worth throttling for
    ///
    /// Pressure means the server reported a remaining budget at or below
    /// 25% of its limit, or reported zero remaining without a limit.
    pub fn under_pressure(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => u64::from(remaining) * 4 <= u64::from(limit),
            (Some(0), None) => true,
            _ => false,
        }
    }
}
