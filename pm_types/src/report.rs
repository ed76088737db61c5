/// Result of a resilient report retrieval
///
/// Callers never see retry bookkeeping. They get the data, the same data
/// served from cache, or a clearly-marked degraded fallback produced by the
/// recovery path after retries were exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report<V> {
    /// Freshly fetched from the remote service
    Fresh(V),

    /// Served from the response cache without a remote call
    Cached(V),

    /// Produced by the recovery path after retry exhaustion
    Degraded(DegradedReport<V>),
}

impl<V> Report<V> {
    pub fn value(&self) -> &V {
        match self {
            Report::Fresh(value) | Report::Cached(value) => value,
            Report::Degraded(degraded) => &degraded.value,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Report::Fresh(value) | Report::Cached(value) => value,
            Report::Degraded(degraded) => degraded.value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Report::Degraded(_))
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Report::Cached(_))
    }
}

/// Degraded fallback value annotated with why degradation happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedReport<V> {
    /// Well-formed fallback value usable by the caller
    pub value: V,

    /// Classified reason, without raw payloads or credentials
    pub reason: String,

    /// How many attempts were made before recovery fired
    pub attempts: u32,
}
