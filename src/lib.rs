//! genexec - execution core for AI media generation APIs
//!
//! Image and video generation APIs are slow, paid, and frequently
//! asynchronous (submit a job, then poll it). This crate wraps provider
//! calls in one reusable pipeline:
//!
//! - a fingerprinting result cache, so identical requests are only paid for once;
//! - a classified retry loop with capped exponential backoff;
//! - a task poller that drives submit-then-poll jobs to a terminal state;
//! - an [`ExecutionCoordinator`] composing the three and emitting one metric
//!   record per call.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use genexec::{Gateway, GenerationRequest, JsonProvider, JsonProviderConfig, ReqwestTransport};
//!
//! #[tokio::main]
//! async fn main() -> genexec::Result<()> {
//!     let transport = Arc::new(ReqwestTransport::new()?);
//!     let acme = JsonProvider::new(
//!         "acme",
//!         JsonProviderConfig::task("https://api.acme.test/v1", "/jobs/{task_id}"),
//!         transport,
//!     )
//!     .api_key("sk-acme");
//!
//!     let gateway = Gateway::builder().provider("acme", Arc::new(acme)).build();
//!
//!     let request = GenerationRequest::new("acme", "video-1", "waves at sunset");
//!     let first = gateway.generate(&request).await?;
//!     let second = gateway.generate(&request).await?;
//!     assert!(!first.cached && second.cached);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod poller;
pub mod providers;
pub mod retry;
pub mod telemetry;
pub mod types;
mod version;

// Re-export main types at crate root
pub use cache::{CacheBackend, CacheBackendKind, CacheConfig, CacheError, CacheKey, MemoryCache, SharedCache};
pub use classify::{RawFailure, TransportFailure, classify};
pub use config::{Config, ConfigError};
pub use coordinator::{ExecutionCoordinator, RunOptions};
pub use error::{ErrorKind, GenError, Result};
pub use gateway::{Gateway, GatewayBuilder};
pub use poller::{PollCadence, PollConfig, TaskPoller, TaskState, TaskStatusSource};
pub use providers::{
    HttpRequest, HttpResponse, HttpTransport, JsonProvider, JsonProviderConfig, ProviderAdapter,
    ProviderMode, ProviderRegistry, ReqwestTransport, Submission, call_provider,
};
pub use retry::{RetryConfig, with_retry};
pub use telemetry::{MetricRecord, MetricsSink, TelemetrySink};
pub use types::{GenerationOutcome, GenerationRequest, GenerationResult, ParamValue};
pub use version::{BuildInfo, PKG_VERSION, version_string};
