//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (e.g. `--config <path>`)
//! 2. `~/.genexec/config.toml` (user)
//! 3. `/etc/genexec/config.toml` (system)
//!
//! Every section and field is optional. API keys never live in the file;
//! providers name the environment variable to read instead.
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "memory"
//! max_entries = 1000
//! ttl_secs = 3600
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//!
//! [polling]
//! timeout_secs = 600
//! cadence = "stepped"
//!
//! [providers.acme]
//! base_url = "https://api.acme.test/v1"
//! status_path = "/jobs/{task_id}"
//! api_key_env = "ACME_API_KEY"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheBackendKind, CacheConfig, DEFAULT_MAX_ENTRIES, MAX_TTL};
use crate::poller::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollCadence, PollConfig};
use crate::providers::json::JsonProviderConfig;
use crate::retry::RetryConfig;

/// Configuration errors. These never cross the coordinator boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("no config file found; create ~/.genexec/config.toml or /etc/genexec/config.toml")]
    NoConfigFile,

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub providers: BTreeMap<String, JsonProviderConfig>,
}

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: CacheBackendKind,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Sweep interval for the memory backend; unset disables the sweeper.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::default(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_ttl_secs() -> u64 {
    3600
}

/// `[retry]`
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Poll cadence as written in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceKind {
    #[default]
    Fixed,
    Stepped,
}

/// `[polling]`
#[derive(Debug, Clone, Deserialize)]
pub struct PollingSection {
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u64,
    /// Interval for the fixed cadence.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub cadence: CadenceKind,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_poll_timeout_secs(),
            interval_secs: default_poll_interval_secs(),
            cadence: CadenceKind::default(),
        }
    }
}

fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT.as_secs()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.genexec/config.toml`
    /// 3. `/etc/genexec/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    /// Load and validate a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".genexec").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/genexec/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(ConfigError::NoConfigFile)
    }

    /// Reject values that would make the core misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be >= 1.0 (got {})",
                self.retry.multiplier
            )));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must not be below retry.initial_delay_ms".to_string(),
            ));
        }
        if self.cache.ttl_secs > MAX_TTL.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl_secs must not exceed {} (got {})",
                MAX_TTL.as_secs(),
                self.cache.ttl_secs
            )));
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.interval_secs must be positive".to_string(),
            ));
        }
        for (name, provider) in &self.providers {
            provider
                .validate()
                .map_err(|reason| ConfigError::Invalid(format!("providers.{name}: {reason}")))?;
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.cache.max_entries)
            .ttl(Duration::from_secs(self.cache.ttl_secs))
            .backend(self.cache.backend)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .multiplier(self.retry.multiplier)
    }

    pub fn poll_config(&self) -> PollConfig {
        let cadence = match self.polling.cadence {
            CadenceKind::Fixed => PollCadence::Fixed(Duration::from_secs(self.polling.interval_secs)),
            CadenceKind::Stepped => PollCadence::Stepped,
        };
        PollConfig::new()
            .timeout(Duration::from_secs(self.polling.timeout_secs))
            .cadence(cadence)
    }
}
