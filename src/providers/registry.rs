//! Provider lookup table.
//!
//! Built once at startup and consulted by provider name for every request.
//! Adapters are either configured [`JsonProvider`]s or custom
//! [`ProviderAdapter`] implementations registered in code.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::http::HttpTransport;
use super::json::{JsonProvider, JsonProviderConfig};
use super::traits::ProviderAdapter;
use crate::Result;
use crate::error::GenError;

/// Name → adapter table.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build JSON providers from configuration sections.
    ///
    /// API keys are read from each provider's `api_key_env` variable; a
    /// missing variable is logged and the provider is registered without a
    /// key (the provider will then answer with `INVALID_CREDENTIALS`).
    pub fn from_configs<'a>(
        configs: impl IntoIterator<Item = (&'a String, &'a JsonProviderConfig)>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let mut registry = Self::new();
        for (name, config) in configs {
            let mut provider = JsonProvider::new(name.clone(), config.clone(), transport.clone());
            if let Some(var) = &config.api_key_env {
                match std::env::var(var) {
                    Ok(key) => provider = provider.api_key(key),
                    Err(_) => warn!(provider = %name, env = %var, "API key variable not set"),
                }
            }
            registry.register(name.clone(), Arc::new(provider));
        }
        registry
    }

    /// Add or replace an adapter.
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        let name = name.into();
        debug!(provider = %name, "registered provider");
        self.providers.insert(name, adapter);
    }

    /// Look up the adapter for a provider name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| GenError::invalid_parameters(format!("unknown provider: {name}")))
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
