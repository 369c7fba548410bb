// Shared cache store behind the caching decorator

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

// Live counters for the cache
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub eviction_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub total_lookups: AtomicUsize,
}

// Point-in-time snapshot of the counters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
    pub total_lookups: usize,
}

// Cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    /// Collapse concurrent misses on the same key into one handler call.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl_seconds: 3600,
            cleanup_interval_seconds: 60,
            single_flight: true,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

/// Key-value store shared by every cached query. Implementations may be
/// in-process or backed by a distributed cache.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Option<Bytes>;

    // `None` falls back to the store's default TTL
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>);

    async fn remove(&self, key: &str) -> bool;
}

struct CacheEntry {
    data: Bytes,
    created_at: Instant,
    ttl: Duration,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// In-process store with per-entry TTL and least-recently-used eviction once
/// `max_entries` is reached.
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
    config: RwLock<CacheConfig>,
    stats: CacheStats,
}

impl InMemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config: RwLock::new(config),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.entries.len(),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            eviction_count: self.stats.eviction_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            total_lookups: self.stats.total_lookups.load(Ordering::SeqCst),
        }
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let count = expired_keys
            .into_iter()
            .filter(|key| self.remove_if_expired(key))
            .count();
        if count > 0 {
            debug!(count, "Purged expired cache entries");
        }
        count
    }

    /// Changes the entry bound, evicting down to it when shrinking.
    pub fn resize(&self, max_entries: usize) {
        self.config.write().max_entries = max_entries;
        while self.entries.len() > max_entries {
            if !self.evict_least_recently_used() {
                break;
            }
        }
    }

    fn evict_least_recently_used(&self) -> bool {
        let oldest_key = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_accessed)
            .map(|entry| entry.key().clone());

        match oldest_key {
            Some(key) => {
                let removed = self.remove_entry(&key);
                if removed {
                    self.stats.eviction_count.fetch_add(1, Ordering::SeqCst);
                }
                removed
            }
            None => false,
        }
    }

    fn remove_entry(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // Re-checks expiry under the shard lock so a concurrent `set` survives
    fn remove_if_expired(&self, key: &str) -> bool {
        let removed = self
            .entries
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some();
        if removed {
            self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        self.stats.total_lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired() {
                entry.last_accessed = Instant::now();
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                return Some(entry.data.clone());
            }
        } else {
            self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        // Entry was stale when read
        self.remove_if_expired(key);
        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
        None
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        let (max_entries, default_ttl) = {
            let config = self.config.read();
            (config.max_entries, config.default_ttl())
        };

        if !self.entries.contains_key(key) && self.entries.len() >= max_entries {
            self.evict_least_recently_used();
        }

        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                created_at: now,
                ttl: ttl.unwrap_or(default_ttl),
                last_accessed: now,
            },
        );
    }

    async fn remove(&self, key: &str) -> bool {
        self.remove_entry(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn small_cache(max_entries: usize) -> InMemoryCache {
        InMemoryCache::new(CacheConfig {
            max_entries,
            ..CacheConfig::default()
        })
    }

    #[tokio::test]
    async fn test_get_returns_stored_bytes() {
        let cache = small_cache(10);
        cache.set("k", Bytes::from_static(b"value"), None).await;

        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"value")));
        assert_eq!(cache.get("missing").await, None);

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.total_lookups, 2);
    }

    #[tokio::test]
    async fn test_expiration_and_ttl() {
        let cache = small_cache(10);
        cache.set("long", Bytes::from_static(b"1"), None).await;
        cache
            .set("short", Bytes::from_static(b"2"), Some(Duration::from_millis(50)))
            .await;

        assert!(cache.get("short").await.is_some());
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get("short").await.is_none());
        assert!(cache.get("long").await.is_some());
        assert_eq!(cache.stats().expired_count, 1);
    }

    #[tokio::test]
    async fn test_stale_removal_keeps_entry_refreshed_in_between() {
        let cache = small_cache(10);
        cache
            .set("k", Bytes::from_static(b"old"), Some(Duration::from_millis(10)))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // A writer refreshes the key after a reader saw it stale
        cache.set("k", Bytes::from_static(b"new"), None).await;
        assert!(!cache.remove_if_expired("k"));

        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"new")));
        assert_eq!(cache.stats().expired_count, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = small_cache(10);
        for i in 0..3 {
            cache
                .set(&format!("k{}", i), Bytes::from_static(b"x"), Some(Duration::from_millis(10)))
                .await;
        }
        cache.set("keep", Bytes::from_static(b"y"), None).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.purge_expired(), 3);
        assert_eq!(cache.stats().items_count, 1);
    }

    #[tokio::test]
    async fn test_eviction_policy_lru() {
        let cache = small_cache(3);
        for key in ["a", "b", "c"] {
            cache.set(key, Bytes::from_static(b"x"), None).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        // Touch "a" so "b" becomes the least recently used
        assert!(cache.get("a").await.is_some());
        cache.set("d", Bytes::from_static(b"x"), None).await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
        assert!(cache.get("d").await.is_some());
        assert_eq!(cache.stats().eviction_count, 1);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = small_cache(2);
        cache.set("a", Bytes::from_static(b"1"), None).await;
        cache.set("b", Bytes::from_static(b"2"), None).await;
        cache.set("a", Bytes::from_static(b"3"), None).await;

        assert_eq!(cache.get("a").await, Some(Bytes::from_static(b"3")));
        assert!(cache.get("b").await.is_some());
        assert_eq!(cache.stats().eviction_count, 0);
    }

    #[tokio::test]
    async fn test_cache_resize() {
        let cache = small_cache(50);
        for i in 0..50 {
            cache.set(&format!("k{}", i), Bytes::from_static(b"x"), None).await;
        }

        cache.resize(10);
        assert_eq!(cache.stats().items_count, 10);

        cache.resize(100);
        for i in 50..120 {
            cache.set(&format!("k{}", i), Bytes::from_static(b"x"), None).await;
        }
        assert_eq!(cache.stats().items_count, 80);
    }

    #[tokio::test]
    async fn test_concurrent_access_with_contention() {
        let cache = Arc::new(small_cache(100));
        let mut handles = vec![];

        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for j in 0..200 {
                    let key = format!("k{}", (i * 7 + j) % 150);
                    if j % 4 == 0 {
                        cache.set(&key, Bytes::from(vec![i as u8, j as u8]), None).await;
                    } else {
                        let _ = cache.get(&key).await;
                    }
                }
            }));
        }

        for handle in futures::future::join_all(handles).await {
            handle.unwrap();
        }

        let stats = cache.stats();
        assert!(stats.items_count <= 100 + 8, "cache grew unbounded: {:?}", stats);
        assert_eq!(stats.total_lookups, stats.hit_count + stats.miss_count);
    }
}
