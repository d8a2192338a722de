//! Gateway: the wired-up execution core.
//!
//! Owns one cache, one metrics sink, one retry policy, one poller and the
//! provider registry, all constructed once and passed down explicitly.
//!
//! ```rust,no_run
//! use genexec::{Config, Gateway, GenerationRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let gateway = Gateway::from_config(&config)?;
//!
//!     let request = GenerationRequest::new("acme", "flux-dev", "a lighthouse at dusk")
//!         .param("size", "1024x1024");
//!     let outcome = gateway.generate(&request).await?;
//!     println!("cached={} {:?}", outcome.cached, outcome.result.get("url"));
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::Result;
use crate::cache::{CacheBackend, CacheBackendKind, MemoryCache, SharedCache};
use crate::config::Config;
use crate::coordinator::{ExecutionCoordinator, RunOptions};
use crate::poller::{PollConfig, TaskPoller};
use crate::providers::{ProviderAdapter, ProviderRegistry, ReqwestTransport, call_provider};
use crate::retry::RetryConfig;
use crate::telemetry::{MetricsSink, TelemetrySink};
use crate::types::{GenerationOutcome, GenerationRequest};

/// Entry point for issuing generation requests.
pub struct Gateway {
    coordinator: ExecutionCoordinator,
    registry: ProviderRegistry,
    poller: TaskPoller,
    defaults: RunOptions,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Build a gateway from a loaded [`Config`].
    ///
    /// When the memory backend has `sweep_interval_secs` set and a tokio
    /// runtime is running, a sweeper task is spawned for it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache_config = config.cache_config();
        let cache: Arc<dyn CacheBackend> = match cache_config.backend {
            CacheBackendKind::Memory => {
                let memory = Arc::new(MemoryCache::new(cache_config.max_entries));
                if let Some(secs) = config.cache.sweep_interval_secs {
                    match tokio::runtime::Handle::try_current() {
                        Ok(_) => {
                            memory.spawn_sweeper(Duration::from_secs(secs));
                        }
                        Err(_) => warn!("no tokio runtime, cache sweeper not started"),
                    }
                }
                memory
            }
            CacheBackendKind::Shared => Arc::new(SharedCache::new(cache_config.max_entries)),
        };

        let transport = Arc::new(ReqwestTransport::new()?);
        let registry = ProviderRegistry::from_configs(&config.providers, transport);
        info!(providers = registry.len(), backend = ?cache_config.backend, "gateway configured");

        Ok(Self::builder()
            .cache(cache)
            .retry(config.retry_config())
            .poll(config.poll_config())
            .registry(registry)
            .run_options(
                RunOptions::new()
                    .cache_enabled(config.cache.enabled)
                    .ttl(cache_config.ttl),
            )
            .build())
    }

    /// Generate with the gateway's default [`RunOptions`].
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        self.generate_with(request, &self.defaults).await
    }

    /// Generate with explicit per-call options.
    pub async fn generate_with(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
    ) -> Result<GenerationOutcome> {
        let adapter = self.registry.get(&request.provider)?;
        self.coordinator
            .run(request, options, |req| {
                call_provider(adapter.as_ref(), &self.poller, req)
            })
            .await
    }

    /// Run several requests concurrently.
    ///
    /// Results are returned in input order; each request succeeds or fails
    /// independently.
    pub async fn generate_batch(
        &self,
        requests: &[GenerationRequest],
        options: &RunOptions,
    ) -> Vec<Result<GenerationOutcome>> {
        join_all(requests.iter().map(|r| self.generate_with(r, options))).await
    }

    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn defaults(&self) -> &RunOptions {
        &self.defaults
    }
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    cache: Option<Arc<dyn CacheBackend>>,
    metrics: Arc<dyn MetricsSink>,
    retry: RetryConfig,
    poll: PollConfig,
    registry: ProviderRegistry,
    defaults: RunOptions,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            metrics: Arc::new(TelemetrySink),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
            registry: ProviderRegistry::new(),
            defaults: RunOptions::default(),
        }
    }

    /// Cache backend. Default: a fresh [`MemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Metrics sink. Default: [`TelemetrySink`].
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn poll(mut self, config: PollConfig) -> Self {
        self.poll = config;
        self
    }

    /// Replace the whole registry.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a single adapter.
    pub fn provider(mut self, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.registry.register(name, adapter);
        self
    }

    /// Options used by [`Gateway::generate`].
    pub fn run_options(mut self, options: RunOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn build(self) -> Gateway {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::default()));
        Gateway {
            coordinator: ExecutionCoordinator::new(cache)
                .metrics(self.metrics)
                .retry(self.retry),
            registry: self.registry,
            poller: TaskPoller::new(self.poll),
            defaults: self.defaults,
        }
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
