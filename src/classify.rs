//! Failure classification.
//!
//! Raw failures (HTTP status codes, transport errors) are mapped into the
//! closed [`ErrorKind`] taxonomy before they reach the retry loop or the
//! caller:
//!
//! | Raw failure                               | Kind                  |
//! |-------------------------------------------|-----------------------|
//! | HTTP 401, 403                             | `INVALID_CREDENTIALS` |
//! | HTTP 404                                  | `RESOURCE_NOT_FOUND`  |
//! | HTTP 408, transport timeout               | `TIMEOUT`             |
//! | HTTP 429                                  | `RATE_LIMIT`          |
//! | HTTP 503                                  | `SERVICE_UNAVAILABLE` |
//! | HTTP 400 (body attached as details)       | `INVALID_PARAMETERS`  |
//! | connection refused / DNS / reset          | `NETWORK`             |
//! | anything else                             | `UNKNOWN`             |

use std::time::Duration;

use serde_json::json;

use crate::error::{ErrorKind, GenError};

/// Longest response body quoted in an error message.
const MAX_BODY_IN_MESSAGE: usize = 512;

/// Transport-level failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Connect,
    /// DNS failure, connection reset, broken body stream, ...
    Other,
}

/// A failure as observed at the HTTP boundary, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// The server answered with a non-success status.
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    /// No usable response arrived.
    Transport {
        kind: TransportFailure,
        message: String,
    },
    /// Something that is neither an HTTP status nor a transport failure.
    Other(String),
}

impl RawFailure {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        RawFailure::Status {
            status,
            body: body.into(),
            retry_after: None,
        }
    }
}

/// Map a raw failure into the taxonomy.
pub fn classify(failure: RawFailure) -> GenError {
    match failure {
        RawFailure::Status {
            status,
            body,
            retry_after,
        } => classify_status(status, body, retry_after),
        RawFailure::Transport {
            kind: TransportFailure::Timeout,
            message,
        } => GenError::timeout(format!("request timed out: {message}")),
        RawFailure::Transport { message, .. } => {
            GenError::network(format!("transport error: {message}"))
        }
        RawFailure::Other(message) => GenError::unknown(message),
    }
}

fn classify_status(status: u16, body: String, retry_after: Option<Duration>) -> GenError {
    let kind = match status {
        401 | 403 => ErrorKind::InvalidCredentials,
        404 => ErrorKind::ResourceNotFound,
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimit,
        503 => ErrorKind::ServiceUnavailable,
        400 => ErrorKind::InvalidParameters,
        _ => ErrorKind::Unknown,
    };

    let mut err = GenError::new(kind, format!("HTTP {status}: {}", truncate(&body)));
    if kind == ErrorKind::InvalidParameters {
        err = err.with_details(json!({ "status": status, "body": body }));
    }
    if kind == ErrorKind::RateLimit {
        err.retry_after = retry_after;
    }
    err
}

fn truncate(body: &str) -> &str {
    if body.len() <= MAX_BODY_IN_MESSAGE {
        return body;
    }
    let mut end = MAX_BODY_IN_MESSAGE;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

impl From<RawFailure> for GenError {
    fn from(failure: RawFailure) -> Self {
        classify(failure)
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            RawFailure::Transport {
                kind: TransportFailure::Timeout,
                message,
            }
        } else if let Some(status) = err.status() {
            RawFailure::status(status.as_u16(), message)
        } else if err.is_connect() {
            RawFailure::Transport {
                kind: TransportFailure::Connect,
                message,
            }
        } else if err.is_builder() || err.is_decode() || err.is_redirect() {
            RawFailure::Other(message)
        } else {
            RawFailure::Transport {
                kind: TransportFailure::Other,
                message,
            }
        }
    }
}

impl From<reqwest::Error> for GenError {
    fn from(err: reqwest::Error) -> Self {
        classify(err.into())
    }
}
