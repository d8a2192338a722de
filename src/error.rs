//! genexec error types
//!
//! Every failure that leaves the execution core is a [`GenError`] carrying
//! exactly one [`ErrorKind`] from a closed taxonomy. Transient kinds are
//! retried by [`with_retry`](crate::retry::with_retry); fatal kinds surface
//! immediately.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Transient
    Network,
    Timeout,
    RateLimit,
    ServiceUnavailable,

    // Fatal
    InvalidCredentials,
    InvalidParameters,
    InvalidModel,
    ResourceNotFound,
    TaskFailed,

    /// Anything the classifier does not recognise. Never retried.
    Unknown,
}

impl ErrorKind {
    /// Whether failures of this kind are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimit
                | ErrorKind::ServiceUnavailable
        )
    }

    /// Stable upper-case name, as used in serialized errors and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorKind::InvalidParameters => "INVALID_PARAMETERS",
            ErrorKind::InvalidModel => "INVALID_MODEL",
            ErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::TaskFailed => "TASK_FAILED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified generation failure.
///
/// Serializes to `{kind, message, details?}`; the retry hint and elapsed
/// duration are carried for the retry loop and metrics but not serialized.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GenError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Provider-supplied back-off hint (e.g. from a `Retry-After` header).
    #[serde(skip)]
    pub retry_after: Option<Duration>,
    /// Wall-clock time spent in the coordinator before the failure surfaced.
    #[serde(skip)]
    pub elapsed: Option<Duration>,
}

impl GenError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            retry_after: None,
            elapsed: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(ErrorKind::RateLimit, "rate limited by provider");
        err.retry_after = retry_after;
        err
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCredentials, message)
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameters, message)
    }

    pub fn invalid_model(model: &str) -> Self {
        Self::new(ErrorKind::InvalidModel, format!("model not supported: {model}"))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceNotFound, message)
    }

    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TaskFailed, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Attach structured diagnostic details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Tag the error with the time spent before it surfaced.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Shorthand for `self.kind.is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<serde_json::Error> for GenError {
    fn from(err: serde_json::Error) -> Self {
        GenError::unknown(format!("JSON error: {err}"))
    }
}

/// Result type alias for genexec operations
pub type Result<T> = std::result::Result<T, GenError>;
