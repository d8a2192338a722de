//! Retry configuration, delay calculation, and the shared retry loop.
//!
//! [`with_retry`] runs an operation up to `max_attempts` times. Every
//! failure is converted into a [`GenError`] (classifying raw HTTP failures
//! on the way); fatal kinds return immediately, retryable kinds sleep for
//! an exponentially growing, capped delay before the next attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::Result;
use crate::error::GenError;
use crate::telemetry;

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use genexec::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .multiplier(3.0);
/// assert_eq!(config.delay_for_attempt(1), Duration::from_millis(600));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Growth factor applied per attempt. Default: 2.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Attempts actually made; zero is treated as one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculate the delay after a failed attempt (0-indexed).
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Calculate the effective delay, respecting provider `retry_after` hints.
    ///
    /// A hint replaces the computed backoff but is still capped at `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Execute an async operation with retry logic.
///
/// The operation's error type only needs to convert into [`GenError`], so
/// closures may return raw [`RawFailure`](crate::classify::RawFailure)s and
/// have them classified here. Fatal errors are returned after a single
/// attempt with no sleep; retryable errors are retried until
/// `config.max_attempts` total attempts have been made, after which the
/// last error is returned.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, provider: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<GenError>,
{
    let attempts = config.attempts();
    let mut attempt = 0;
    loop {
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(e) => e.into(),
        };
        if !err.is_retryable() {
            return Err(err);
        }
        attempt += 1;
        if attempt >= attempts {
            return Err(err);
        }

        metrics::counter!(telemetry::RETRIES_TOTAL,
            "provider" => provider.to_owned(),
            "kind" => err.kind.as_str(),
        )
        .increment(1);
        let delay = config.effective_delay(attempt - 1, err.retry_after);
        warn!(
            provider,
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient error"
        );
        tokio::time::sleep(delay).await;
    }
}
