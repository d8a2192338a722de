//! Provider integrations.
//!
//! - [`traits::ProviderAdapter`]: what every integration implements.
//! - [`http`]: the HTTP client capability adapters build on.
//! - [`json::JsonProvider`]: a config-driven adapter for JSON task/sync APIs.
//! - [`registry::ProviderRegistry`]: name → adapter lookup table.

pub mod http;
pub mod json;
pub mod registry;
pub mod traits;

pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use json::{JsonProvider, JsonProviderConfig, ProviderMode};
pub use registry::ProviderRegistry;
pub use traits::{ProviderAdapter, Submission, call_provider};
