use std::time::Instant;

/// Time tracking for the token buckets
///
/// Uses Instant for monotonic time measurements with nanosecond precision.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeSource {
    /// Epoch for relative time measurements
    epoch: Instant,
}

impl TimeSource {
    #[inline(always)]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    /// Current time in nanoseconds since epoch
    #[inline(always)]
    pub fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}
