//! moka-backed result cache.
//!
//! Uses moka's LRU eviction policy and a per-entry [`Expiry`] so the TTL
//! passed to `set` is honoured per key. moka evicts during housekeeping, not
//! inside `insert`, so `set` runs the pending housekeeping before returning
//! and the entry count is back within `max_entries` once it does.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::policy::EvictionPolicy;

use super::{CacheBackend, CacheError, CacheKey, clamp_ttl};
use crate::types::GenerationResult;

#[derive(Debug, Clone)]
struct TimedResult {
    value: GenerationResult,
    ttl: Duration,
}

/// Expire each entry after the TTL it was inserted with.
struct PerEntryTtl;

impl Expiry<CacheKey, TimedResult> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &TimedResult,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &TimedResult,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Concurrent result cache backed by `moka::future::Cache`.
pub struct SharedCache {
    cache: Cache<CacheKey, TimedResult>,
}

impl SharedCache {
    /// Create a cache bounded to `max_entries` entries.
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Approximate entry count (exact after [`sync`](Self::sync)).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Run moka's pending housekeeping (evictions, expirations).
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheBackend for SharedCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<GenerationResult>, CacheError> {
        Ok(self.cache.get(key).await.map(|timed| timed.value))
    }

    async fn set(
        &self,
        key: &CacheKey,
        value: GenerationResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ttl = clamp_ttl(ttl);
        self.cache
            .insert(key.clone(), TimedResult { value, ttl })
            .await;
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(n: i64) -> GenerationResult {
        GenerationResult::success().field("n", n)
    }

    #[tokio::test]
    async fn round_trip() {
        let cache = SharedCache::new(10);
        let key = CacheKey::from("a");
        cache
            .set(&key, result(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(result(1)));
    }

    #[tokio::test]
    async fn per_entry_ttl_is_honoured() {
        let cache = SharedCache::new(10);
        let short = CacheKey::from("short");
        let long = CacheKey::from("long");
        cache
            .set(&short, result(1), Duration::from_millis(1))
            .await
            .unwrap();
        cache
            .set(&long, result(2), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(cache.get(&short).await.unwrap().is_none());
        assert_eq!(cache.get(&long).await.unwrap(), Some(result(2)));
    }

    #[tokio::test]
    async fn size_bound_holds_when_set_returns() {
        let cache = SharedCache::new(2);
        let names = ["a", "b", "c", "d"];
        for (i, name) in names.into_iter().enumerate() {
            cache
                .set(&CacheKey::from(name), result(i as i64), Duration::from_secs(60))
                .await
                .unwrap();
            assert!(cache.entry_count() <= 2, "after {name}: {}", cache.entry_count());
        }

        let mut live = 0;
        for name in names {
            if cache.get(&CacheKey::from(name)).await.unwrap().is_some() {
                live += 1;
            }
        }
        assert!(live <= 2, "live entries with max 2: {live}");
    }

    #[tokio::test]
    async fn huge_ttl_is_clamped() {
        let cache = SharedCache::new(10);
        let key = CacheKey::from("forever");
        cache.set(&key, result(1), Duration::MAX).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(result(1)));
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = SharedCache::new(10);
        let a = CacheKey::from("a");
        let b = CacheKey::from("b");
        cache.set(&a, result(1), Duration::from_secs(60)).await.unwrap();
        cache.set(&b, result(2), Duration::from_secs(60)).await.unwrap();

        cache.delete(&a).await.unwrap();
        assert!(cache.get(&a).await.unwrap().is_none());

        cache.clear().await.unwrap();
        assert!(cache.get(&b).await.unwrap().is_none());
    }
}
