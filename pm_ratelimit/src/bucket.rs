use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::RwLock;

use crate::time::TimeSource;

// Scaling factors for fixed-point arithmetic to maintain precision
const TOKEN_SCALE: u64 = 1000;
const RATE_SCALE: u64 = 1_000_000_000;

/// Immutable bucket parameters, swapped atomically on reconfiguration
///
/// Readers clone the Arc and work against a single consistent snapshot;
/// an in-flight acquire observes either the old or the new configuration,
/// never a torn mix.
#[derive(Debug)]
pub(crate) struct BucketConfig {
    /// Maximum number of permits (capacity)
    pub capacity: u32,

    /// Refill rate in permits per second
    pub rate_per_second: f64,

    /// Rate of permit generation per nanosecond (scaled by RATE_SCALE)
    pub rate_per_nano: u64,
}

impl BucketConfig {
    fn new(capacity: u32, rate_per_second: f64) -> Self {
        // Pre-compute rate per nanosecond with scaling for precision.
        // Floored at 1 so an extremely small rate (e.g. a heavy adaptive
        // throttle on an already slow bucket) still refills eventually
        // instead of truncating to a bucket that never recovers.
        let rate_per_nano = (((rate_per_second * RATE_SCALE as f64 * TOKEN_SCALE as f64) / 1_000_000_000.0) as u64).max(1);
        Self { capacity, rate_per_second, rate_per_nano }
    }

    #[inline(always)]
    fn capacity_scaled(&self) -> u64 {
        u64::from(self.capacity) * TOKEN_SCALE
    }
}

/// Adaptive throttle installed from server quota feedback
///
/// Holds the pre-throttle configuration so it can be restored once the
/// server's reset deadline passes.
struct Throttle {
    base: Arc<BucketConfig>,
    deadline_nanos: u64,
}

/// Token bucket with lazy refill and lock-free accounting
///
/// Permits accumulate continuously at the configured rate up to capacity and
/// are consumed per acquisition. The hot path is CAS loops over two atomics;
/// the configuration snapshot is only locked for reconfiguration and
/// throttle transitions.
pub struct TokenBucket {
    /// Current number of available permits (scaled by TOKEN_SCALE)
    tokens: AtomicU64,

    /// Last refill timestamp in nanoseconds
    last_refill: AtomicU64,

    /// Active configuration snapshot
    config: RwLock<Arc<BucketConfig>>,

    /// Adaptive throttle state, if any
    throttle: RwLock<Option<Throttle>>,

    /// Time source for consistent time measurements
    time_source: TimeSource,
}

impl TokenBucket {
    /// Create a new token bucket
    ///
    /// # Panics
    /// Panics if capacity is 0 or rate is not positive. Callers validate
    /// user-supplied settings before construction.
    pub fn new(capacity: u32, rate_per_second: f64) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        assert!(rate_per_second > 0.0, "Rate must be greater than 0");

        let time_source = TimeSource::new();
        let now = time_source.now_nanos();
        let config = BucketConfig::new(capacity, rate_per_second);

        Self {
            tokens: AtomicU64::new(config.capacity_scaled()),
            last_refill: AtomicU64::new(now),
            config: RwLock::new(Arc::new(config)),
            throttle: RwLock::new(None),
            time_source,
        }
    }

    /// Try to acquire permits without blocking. Never fails with an error;
    /// returns false when the bucket cannot satisfy the request right now.
    pub fn try_acquire(&self, permits: u32) -> bool {
        if permits == 0 {
            return true;
        }

        let config = self.config_snapshot();
        self.refill(&config);

        let required = u64::from(permits) * TOKEN_SCALE;

        // CAS loop: check-and-decrement as a single atomic step
        loop {
            let current = self.tokens.load(Ordering::Acquire);

            if current < required {
                return false;
            }

            match self.tokens.compare_exchange_weak(current, current - required, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => return true,
                Err(_) => continue, // CAS failed due to contention, retry
            }
        }
    }

    /// Number of currently available permits
    pub fn available(&self) -> u32 {
        let config = self.config_snapshot();
        self.refill(&config);
        (self.tokens.load(Ordering::Relaxed) / TOKEN_SCALE) as u32
    }

    /// Current capacity
    pub fn capacity(&self) -> u32 {
        self.config_snapshot().capacity
    }

    /// Current effective refill rate in permits per second
    pub fn rate_per_second(&self) -> f64 {
        self.config_snapshot().rate_per_second
    }

    /// Estimated time until `permits` could be acquired
    ///
    /// Zero when the request is satisfiable now; otherwise the deficit
    /// divided by the effective refill rate, rounded up.
    pub fn estimated_wait(&self, permits: u32) -> Duration {
        let config = self.config_snapshot();
        self.refill(&config);

        let required = u64::from(permits) * TOKEN_SCALE;
        let current = self.tokens.load(Ordering::Relaxed);
        if current >= required {
            return Duration::ZERO;
        }
        if config.rate_per_nano == 0 {
            // No refill at all: the deficit can never be satisfied
            return Duration::MAX;
        }

        let deficit = required - current;
        // wait_nanos = deficit / (rate_per_nano / RATE_SCALE), rounded up
        let wait_nanos = (u128::from(deficit) * u128::from(RATE_SCALE)).div_ceil(u128::from(config.rate_per_nano));
        Duration::from_nanos(wait_nanos.min(u128::from(u64::MAX)) as u64)
    }

    /// Replace rate and capacity atomically
    ///
    /// Clears any active throttle; the new settings are authoritative.
    /// Available permits are clamped to the new capacity.
    pub fn reconfigure(&self, capacity: u32, rate_per_second: f64) {
        assert!(capacity > 0, "Capacity must be greater than 0");
        assert!(rate_per_second > 0.0, "Rate must be greater than 0");

        let new_config = Arc::new(BucketConfig::new(capacity, rate_per_second));

        let mut throttle = self.throttle.write();
        let mut config = self.config.write();
        *throttle = None;
        let capacity_scaled = new_config.capacity_scaled();
        *config = new_config;
        drop(config);
        drop(throttle);

        // Clamp tokens to the new capacity
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current <= capacity_scaled {
                break;
            }
            if self.tokens.compare_exchange_weak(current, capacity_scaled, Ordering::Release, Ordering::Relaxed).is_ok() {
                break;
            }
        }
    }

    /// Shrink the effective rate by `factor` for the given window
    ///
    /// An already-throttled bucket keeps its original base configuration and
    /// only extends the deadline, so repeated server signals do not compound
    /// the reduction. The base is restored lazily by the first operation
    /// that observes an expired deadline.
    pub fn throttle_for(&self, factor: f64, window: Duration) {
        let deadline_nanos = self.time_source.now_nanos().saturating_add(window.as_nanos() as u64);

        let mut throttle = self.throttle.write();
        let mut config = self.config.write();

        let base = match throttle.as_ref() {
            Some(active) => Arc::clone(&active.base),
            None => Arc::clone(&config),
        };

        let reduced_rate = (base.rate_per_second * factor).max(f64::MIN_POSITIVE);
        *config = Arc::new(BucketConfig::new(base.capacity, reduced_rate));
        *throttle = Some(Throttle { base, deadline_nanos });
    }

    /// Whether an adaptive throttle is currently active
    pub fn is_throttled(&self) -> bool {
        self.maybe_restore(self.time_source.now_nanos());
        self.throttle.read().is_some()
    }

    /// Reset to a full bucket
    pub fn reset(&self) {
        let config = self.config_snapshot();
        let now = self.time_source.now_nanos();
        self.tokens.store(config.capacity_scaled(), Ordering::Release);
        self.last_refill.store(now, Ordering::Release);
    }

    /// Consistent configuration snapshot, restoring an expired throttle first
    fn config_snapshot(&self) -> Arc<BucketConfig> {
        self.maybe_restore(self.time_source.now_nanos());
        Arc::clone(&self.config.read())
    }

    /// Restore the base configuration once the throttle deadline has passed
    fn maybe_restore(&self, now: u64) {
        {
            let throttle = self.throttle.read();
            match throttle.as_ref() {
                Some(active) if now >= active.deadline_nanos => {}
                _ => return,
            }
        }

        let mut throttle = self.throttle.write();
        if let Some(active) = throttle.as_ref() {
            if now >= active.deadline_nanos {
                *self.config.write() = Arc::clone(&active.base);
                *throttle = None;
            }
        }
    }

    /// Refill permits based on elapsed time since last refill
    ///
    /// Winning the CAS on the timestamp grants the right to add permits;
    /// losers simply observe the winner's refill.
    #[inline(always)]
    fn refill(&self, config: &BucketConfig) {
        let now = self.time_source.now_nanos();
        let last = self.last_refill.load(Ordering::Relaxed);

        let elapsed = now.saturating_sub(last);
        if elapsed == 0 {
            return;
        }

        // tokens_to_add = (elapsed * rate_per_nano) / RATE_SCALE, widened to
        // avoid overflow for long idle periods at high rates
        let tokens_to_add =
            ((u128::from(elapsed) * u128::from(config.rate_per_nano)) / u128::from(RATE_SCALE)).min(u128::from(u64::MAX)) as u64;

        if tokens_to_add == 0 {
            return;
        }

        if self.last_refill.compare_exchange(last, now, Ordering::Release, Ordering::Relaxed).is_ok() {
            let capacity_scaled = config.capacity_scaled();

            loop {
                let current = self.tokens.load(Ordering::Acquire);
                let new_tokens = current.saturating_add(tokens_to_add).min(capacity_scaled);

                if current == new_tokens {
                    // Already at capacity
                    break;
                }

                match self.tokens.compare_exchange_weak(current, new_tokens, Ordering::Release, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(_) => continue, // Retry on contention
                }
            }
        }
    }
}
