//! Execution coordinator.
//!
//! Every generation request goes through the same sequence:
//!
//! ```text
//!   fingerprint ──► cache.get ──hit──► return (cached: true)
//!                       │
//!                      miss
//!                       ▼
//!             with_retry(provider_call)   ◄── may poll a remote task
//!                       │
//!                 ok ───┴─── err
//!                 │           │
//!          cache.set     propagate (never cached)
//!                 │           │
//!                 └─► metrics sink ◄─┘
//! ```
//!
//! The coordinator does not care whether `provider_call` answers directly
//! or drives a [`TaskPoller`](crate::TaskPoller); it only retries it.
//! Cache failures degrade to a miss (read) or a logged no-op (write).
//! Concurrent identical requests are not deduplicated: both miss, both call
//! the provider, and the later write wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::Result;
use crate::cache::{CacheBackend, CacheKey, DEFAULT_TTL, MemoryCache};
use crate::retry::{RetryConfig, with_retry};
use crate::telemetry::{self, MetricRecord, MetricsSink, TelemetrySink};
use crate::types::{GenerationOutcome, GenerationRequest, GenerationResult};

/// Per-call options.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Consult and populate the result cache. Default: true.
    pub cache_enabled: bool,
    /// TTL for a freshly cached result. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            ttl: DEFAULT_TTL,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the cache entirely for this call.
    pub fn no_cache() -> Self {
        Self {
            cache_enabled: false,
            ..Self::default()
        }
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Composes the result cache, retry loop and metrics sink.
///
/// Construct one per process and share it; the cache and sink are
/// injected so tests can use fresh instances.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    cache: Arc<dyn CacheBackend>,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryConfig,
}

impl ExecutionCoordinator {
    /// Coordinator over `cache`, reporting to the `metrics` facade with
    /// the default retry policy.
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            cache,
            metrics: Arc::new(TelemetrySink),
            retry: RetryConfig::default(),
        }
    }

    /// Replace the metrics sink.
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    /// Replace the retry policy.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        &self.cache
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Execute one request.
    ///
    /// On a cache hit `provider_call` is never invoked. On a miss it runs
    /// under the retry policy; successful results are cached (when
    /// `options.cache_enabled`) and failures are returned tagged with the
    /// elapsed time. Exactly one [`MetricRecord`] is written either way.
    #[instrument(skip_all, fields(provider = %request.provider, model = %request.model))]
    pub async fn run<'a, F, Fut>(
        &self,
        request: &'a GenerationRequest,
        options: &RunOptions,
        provider_call: F,
    ) -> Result<GenerationOutcome>
    where
        F: Fn(&'a GenerationRequest) -> Fut,
        Fut: Future<Output = Result<GenerationResult>>,
    {
        let start = Instant::now();
        let key = options
            .cache_enabled
            .then(|| CacheKey::for_request(request));

        if let Some(key) = &key
            && let Some(result) = self.lookup(key, &request.provider).await
        {
            let duration = start.elapsed();
            debug!(%key, "serving cached result");
            self.record(request, duration, true, true);
            return Ok(GenerationOutcome {
                result,
                cached: true,
                duration,
            });
        }

        match with_retry(&self.retry, &request.provider, || provider_call(request)).await {
            Ok(result) => {
                if let Some(key) = &key
                    && result.is_cacheable()
                {
                    self.store(key, &result, options.ttl).await;
                }
                let duration = start.elapsed();
                self.record(request, duration, result.success, false);
                Ok(GenerationOutcome {
                    result,
                    cached: false,
                    duration,
                })
            }
            Err(e) => {
                let duration = start.elapsed();
                self.record(request, duration, false, false);
                Err(e.with_elapsed(duration))
            }
        }
    }

    /// Drop any cached result for `request`.
    pub async fn invalidate(&self, request: &GenerationRequest) {
        let key = CacheKey::for_request(request);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(%key, error = %e, "cache delete failed");
        }
    }

    async fn lookup(&self, key: &CacheKey, provider: &str) -> Option<GenerationResult> {
        let found = match self.cache.get(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "operation" => "get")
                    .increment(1);
                None
            }
        };
        let counter = if found.is_some() {
            telemetry::CACHE_HITS_TOTAL
        } else {
            telemetry::CACHE_MISSES_TOTAL
        };
        metrics::counter!(counter, "provider" => provider.to_owned()).increment(1);
        found
    }

    async fn store(&self, key: &CacheKey, result: &GenerationResult, ttl: Duration) {
        if let Err(e) = self.cache.set(key, result.clone(), ttl).await {
            warn!(%key, error = %e, "cache write failed, result not cached");
            metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "operation" => "set").increment(1);
        }
    }

    fn record(&self, request: &GenerationRequest, duration: Duration, success: bool, from_cache: bool) {
        self.metrics.record(&MetricRecord {
            provider: request.provider.clone(),
            model: request.model.clone(),
            duration,
            success,
            from_cache,
        });
    }
}

impl Default for ExecutionCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCache::default()))
    }
}
