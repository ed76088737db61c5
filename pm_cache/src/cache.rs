use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use dashmap::DashMap;
use pm_types::CacheConfig;
use pm_types::Result;
use pm_types::TtlClass;
use tracing::debug;

/// One cached value with its expiry window
///
/// An entry is logically absent once its expiry passes, even while still
/// physically present until a read or sweep removes it.
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Cache counter snapshot. Monotonic until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit share of all lookups, in [0, 1]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

/// TTL-keyed store of previously computed responses
///
/// TTL is a property of the data's stability class, configured per class and
/// not per call. Lookups and writes are independently atomic; there is no
/// single-flight guarantee, so concurrent misses for the same key may each
/// invoke their supplier (last write wins, values are never torn).
pub struct ResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    /// Create a cache from validated per-class TTLs
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Live value for a key, if any
    ///
    /// An expired entry counts as a miss and is removed on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value under the TTL of its stability class
    pub fn insert(&self, key: &str, class: TtlClass, value: V) {
        let now = Instant::now();
        let entry = CacheEntry { value, created_at: now, expires_at: now + self.config.ttl_for(class) };
        debug!(key, class = class.as_str(), "caching response");
        self.entries.insert(key.to_string(), entry);
    }

    /// Return the live value for a key, computing and storing it on a miss
    ///
    /// A supplier failure is propagated unchanged and nothing is stored.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, class: TtlClass, supplier: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = supplier().await?;
        self.insert(key, class, value.clone());
        Ok(value)
    }

    /// Remove one entry immediately. Returns whether it existed.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every entry whose key starts with the prefix
    pub fn evict_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(prefix, removed, "evicted by prefix");
        }
        removed
    }

    /// Drop all entries
    pub fn clear(&self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Physically remove entries that already expired logically
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Age of the live entry for a key
    pub fn entry_age(&self, key: &str) -> Option<std::time::Duration> {
        let now = Instant::now();
        self.entries.get(key).filter(|entry| !entry.is_expired(now)).map(|entry| now - entry.created_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Explicit operator reset of the counters
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use super::*;

    fn cache_with_live_ttl(ttl_ms: u64) -> ResponseCache<String> {
        ResponseCache::new(CacheConfig { ttl_live_ms: ttl_ms, ..Default::default() }).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let cache = cache_with_live_ttl(60_000);

        cache.insert("weekly:42", TtlClass::Weekly, "report".to_string());
        assert_eq!(cache.get("weekly:42"), Some("report".to_string()));
        assert_eq!(cache.get("weekly:7"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ttl_expiry_boundary() {
        let cache = cache_with_live_ttl(50);

        cache.insert("live:1", TtlClass::Live, "status".to_string());

        // Well inside the window: returned unchanged
        assert_eq!(cache.get("live:1"), Some("status".to_string()));

        std::thread::sleep(Duration::from_millis(80));

        // Past the window: logically absent
        assert_eq!(cache.get("live:1"), None);
        assert!(cache.is_empty(), "expired entry should be removed on read");
    }

    #[tokio::test]
    async fn test_get_or_compute_single_supplier_call() {
        let cache = cache_with_live_ttl(60_000);
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let value: std::result::Result<String, ()> = cache
                .get_or_compute("weekly:42", TtlClass::Weekly, || async {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Ok("summary".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "summary");
        }

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_recomputes_after_expiry() {
        let cache = cache_with_live_ttl(30);
        let calls = AtomicU32::new(0);

        let supplier = || async {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok::<_, ()>("status".to_string())
        };

        cache.get_or_compute("live:1", TtlClass::Live, supplier).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.get_or_compute("live:1", TtlClass::Live, supplier).await.unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_supplier_failure_not_cached() {
        let cache = cache_with_live_ttl(60_000);

        let failed: std::result::Result<String, &str> =
            cache.get_or_compute("live:1", TtlClass::Live, || async { Err("boom") }).await;
        assert_eq!(failed.unwrap_err(), "boom");
        assert!(cache.is_empty());

        let ok: std::result::Result<String, &str> =
            cache.get_or_compute("live:1", TtlClass::Live, || async { Ok("ok".to_string()) }).await;
        assert_eq!(ok.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_no_single_flight_guarantee() {
        // Two concurrent misses for the same key may both compute. This
        // documents the behavior rather than enforcing deduplication.
        let cache = Arc::new(cache_with_live_ttl(60_000));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..2 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("live:1", TtlClass::Live, || async {
                        calls.fetch_add(1, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok::<_, ()>("status".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "status");
        }

        let observed = calls.load(Ordering::Relaxed);
        assert!((1..=2).contains(&observed), "got {observed}");
    }

    #[test]
    fn test_evict() {
        let cache = cache_with_live_ttl(60_000);
        cache.insert("live:1", TtlClass::Live, "a".to_string());

        assert!(cache.evict("live:1"));
        assert!(!cache.evict("live:1"));
        assert_eq!(cache.get("live:1"), None);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_evict_prefix() {
        let cache = cache_with_live_ttl(60_000);
        cache.insert("project:42:weekly", TtlClass::Weekly, "a".to_string());
        cache.insert("project:42:daily", TtlClass::Daily, "b".to_string());
        cache.insert("project:7:weekly", TtlClass::Weekly, "c".to_string());

        assert_eq!(cache.evict_prefix("project:42:"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("project:7:weekly"), Some("c".to_string()));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_clear() {
        let cache = cache_with_live_ttl(60_000);
        cache.insert("a", TtlClass::Live, "1".to_string());
        cache.insert("b", TtlClass::Live, "2".to_string());

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = cache_with_live_ttl(30);
        cache.insert("stale", TtlClass::Live, "old".to_string());
        cache.insert("fresh", TtlClass::Weekly, "new".to_string());

        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some("new".to_string()));
    }

    #[test]
    fn test_entry_age() {
        let cache = cache_with_live_ttl(60_000);
        cache.insert("live:1", TtlClass::Live, "a".to_string());

        std::thread::sleep(Duration::from_millis(20));
        let age = cache.entry_age("live:1").unwrap();
        assert!(age >= Duration::from_millis(20));
        assert!(cache.entry_age("missing").is_none());
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let cache = Arc::new(cache_with_live_ttl(60_000));
        let mut handles = vec![];

        for thread_id in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("key:{}", i % 10);
                    if thread_id % 2 == 0 {
                        cache.insert(&key, TtlClass::Live, format!("value-{thread_id}-{i}"));
                    } else {
                        let _ = cache.get(&key);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // Values are whole writes, never torn
        for i in 0..10 {
            if let Some(value) = cache.get(&format!("key:{i}")) {
                assert!(value.starts_with("value-"));
            }
        }
    }

    #[test]
    fn test_reset_stats() {
        let cache = cache_with_live_ttl(60_000);
        cache.insert("a", TtlClass::Live, "1".to_string());
        let _ = cache.get("a");
        let _ = cache.get("missing");

        cache.reset_stats();
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }
}
