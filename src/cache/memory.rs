//! Default in-process result cache.
//!
//! Entries carry their own expiry instant and an access sequence number.
//! Expiry is checked lazily on `get`; [`MemoryCache::purge_expired`] (or a
//! sweeper task from [`MemoryCache::spawn_sweeper`]) reclaims entries that
//! nobody reads again. Eviction removes the entry with the lowest access
//! sequence, i.e. the one read or written longest ago.
//!
//! All map mutations happen under one mutex that is never held across an
//! `.await`, so check-then-delete and insert-then-evict are atomic with
//! respect to concurrent requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheBackend, CacheError, CacheKey, clamp_ttl};
use crate::types::GenerationResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: GenerationResult,
    expires_at: Instant,
    last_accessed_at: Instant,
    /// Monotonic access counter; breaks ties between equal instants.
    access_seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Evict least-recently-accessed entries until at most `max` remain.
    fn evict_to(&mut self, max: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_seq)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// Bounded, TTL-based in-memory cache with LRU-by-access eviction.
#[derive(Debug)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl MemoryCache {
    /// Create an empty cache holding at most `max_entries` live entries.
    pub fn new(max_entries: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: usize::try_from(max_entries).unwrap_or(usize::MAX),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Synchronous lookup; see [`CacheBackend::get`].
    pub fn get_entry(&self, key: &CacheKey) -> Option<GenerationResult> {
        let now = Instant::now();
        let mut inner = self.lock();
        let seq = inner.bump();
        match inner.entries.get_mut(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed_at = now;
                entry.access_seq = seq;
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }
        inner.entries.remove(key);
        None
    }

    /// Synchronous insert; see [`CacheBackend::set`].
    pub fn set_entry(&self, key: &CacheKey, value: GenerationResult, ttl: Duration) {
        let now = Instant::now();
        let mut inner = self.lock();
        let seq = inner.bump();
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: now + clamp_ttl(ttl),
                last_accessed_at: now,
                access_seq: seq,
            },
        );
        if inner.entries.len() > self.max_entries {
            // Expired entries are not live; drop them before evicting live ones.
            inner.purge_expired(now);
            let evicted = inner.evict_to(self.max_entries);
            if evicted > 0 {
                debug!(evicted, max_entries = self.max_entries, "evicted cache entries");
            }
        }
    }

    /// Remove an entry if present.
    pub fn remove(&self, key: &CacheKey) {
        self.lock().entries.remove(key);
    }

    /// Remove every entry.
    pub fn clear_all(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When `key` was last read or written, if it is stored.
    pub fn last_accessed(&self, key: &CacheKey) -> Option<Instant> {
        self.lock().entries.get(key).map(|e| e.last_accessed_at)
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Spawn a background task that purges expired entries every `interval`.
    ///
    /// Only reclaims memory; lookups already ignore expired entries.
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "swept expired cache entries");
                }
            }
        })
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(super::DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<GenerationResult>, CacheError> {
        Ok(self.get_entry(key))
    }

    async fn set(
        &self,
        key: &CacheKey,
        value: GenerationResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set_entry(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.clear_all();
        Ok(())
    }
}
