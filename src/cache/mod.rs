//! Result caching subsystem.
//!
//! - [`key::CacheKey`]: deterministic request fingerprints.
//! - [`CacheBackend`]: the `get/set/delete/clear` contract every store
//!   honours: expiry is checked on read, and when the store is full the
//!   least-recently *accessed* entry goes first.
//! - [`memory::MemoryCache`]: default in-process backend with exact
//!   LRU-by-access eviction.
//! - [`shared::SharedCache`]: moka-backed backend for heavily concurrent
//!   use; `set` drives moka's housekeeping so the size bound holds on return.
//!
//! TTLs longer than [`MAX_TTL`] are clamped by every built-in backend.
//!
//! # Backend failures
//!
//! A backend may fail (e.g. a remote store is unreachable). The
//! [`ExecutionCoordinator`](crate::ExecutionCoordinator) treats a failed
//! read as a miss and a failed write as a logged no-op; a cache error never
//! fails a generation.

pub mod key;
pub mod memory;
pub mod shared;

pub use key::CacheKey;
pub use memory::MemoryCache;
pub use shared::SharedCache;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::GenerationResult;

/// Default maximum number of live entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 1_000;

/// Default time-to-live for cached results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Longest TTL a backend will honour; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Clamp `ttl` to [`MAX_TTL`] so expiry arithmetic cannot overflow.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.min(MAX_TTL)
}

/// Error raised by a cache backend.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cache backend error: {0}")]
pub struct CacheError(pub String);

/// Key → result store with per-entry TTL and bounded size.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up a live entry. Expired entries are removed and reported absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<GenerationResult>, CacheError>;

    /// Insert or overwrite an entry, evicting least-recently-accessed
    /// entries while the store is over capacity.
    async fn set(
        &self,
        key: &CacheKey,
        value: GenerationResult,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}

/// Which built-in backend to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Shared,
}

/// Configuration for the result cache.
///
/// ```rust
/// # use genexec::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of live entries. Default: 1,000.
    pub max_entries: u64,
    /// Time-to-live applied by the coordinator. Default: 1 hour.
    pub ttl: Duration,
    /// Backend to build. Default: [`CacheBackendKind::Memory`].
    pub backend: CacheBackendKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            backend: CacheBackendKind::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of live entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Select the backend.
    pub fn backend(mut self, backend: CacheBackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Construct the configured backend.
    pub fn build(&self) -> Arc<dyn CacheBackend> {
        match self.backend {
            CacheBackendKind::Memory => Arc::new(MemoryCache::new(self.max_entries)),
            CacheBackendKind::Shared => Arc::new(SharedCache::new(self.max_entries)),
        }
    }
}
