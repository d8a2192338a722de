//! Tests for the retry engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use genexec::{ErrorKind, GenError, RawFailure, RetryConfig, with_retry};
use tokio::time::Instant;

/// Operation that fails with `error` for the first `failures` calls.
struct Flaky {
    calls: AtomicU32,
    failures: u32,
    error: GenError,
}

impl Flaky {
    fn new(failures: u32, error: GenError) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
            error,
        }
    }

    async fn call(&self) -> genexec::Result<&'static str> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(self.error.clone())
        } else {
            Ok("done")
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Paused-clock elapsed time, allowing for millisecond timer rounding.
fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

fn fast() -> RetryConfig {
    RetryConfig::new()
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
}

// =========================================================================
// Attempt counting
// =========================================================================

#[tokio::test]
async fn fatal_error_is_attempted_once() {
    let op = Flaky::new(u32::MAX, GenError::invalid_credentials("bad key"));
    let err = with_retry(&fast(), "test", || op.call()).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::InvalidCredentials);
    assert_eq!(op.calls(), 1);
}

#[tokio::test]
async fn every_fatal_kind_short_circuits() {
    let fatal = [
        GenError::invalid_credentials("x"),
        GenError::invalid_parameters("x"),
        GenError::invalid_model("x"),
        GenError::not_found("x"),
        GenError::task_failed("x"),
        GenError::unknown("x"),
    ];
    for error in fatal {
        let kind = error.kind;
        let op = Flaky::new(u32::MAX, error);
        let err = with_retry(&fast(), "test", || op.call()).await.unwrap_err();
        assert_eq!(err.kind, kind);
        assert_eq!(op.calls(), 1, "{kind} was retried");
    }
}

#[tokio::test]
async fn retryable_error_exhausts_max_attempts() {
    let op = Flaky::new(u32::MAX, GenError::network("reset"));
    let err = with_retry(&fast().max_attempts(4), "test", || op.call())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(op.calls(), 4);
}

#[tokio::test]
async fn transient_failures_then_success() {
    let op = Flaky::new(2, GenError::service_unavailable("busy"));
    let value = with_retry(&fast(), "test", || op.call()).await.unwrap();

    assert_eq!(value, "done");
    assert_eq!(op.calls(), 3);
}

#[tokio::test]
async fn single_attempt_policy_never_retries() {
    let op = Flaky::new(u32::MAX, GenError::timeout("slow"));
    let err = with_retry(&RetryConfig::disabled(), "test", || op.call())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(op.calls(), 1);
}

#[tokio::test]
async fn zero_max_attempts_still_calls_once() {
    let op = Flaky::new(0, GenError::network("unused"));
    let value = with_retry(&fast().max_attempts(0), "test", || op.call())
        .await
        .unwrap();
    assert_eq!(value, "done");
    assert_eq!(op.calls(), 1);
}

#[tokio::test]
async fn raw_failures_are_classified_before_deciding() {
    let calls = AtomicU32::new(0);
    let err = with_retry(&fast(), "test", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(RawFailure::status(401, "unauthorized")) }
    })
    .await
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidCredentials);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let calls = AtomicU32::new(0);
    let err = with_retry(&fast(), "test", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(RawFailure::status(503, "maintenance")) }
    })
    .await
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// =========================================================================
// Backoff timing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn default_backoff_sleeps_one_then_two_seconds() {
    let op = Flaky::new(u32::MAX, GenError::network("down"));
    let start = Instant::now();

    let _ = with_retry(&RetryConfig::default(), "test", || op.call()).await;

    assert_eq!(op.calls(), 3);
    assert_elapsed(start, Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn backoff_is_capped_at_max_delay() {
    let config = RetryConfig::new()
        .max_attempts(5)
        .initial_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(3))
        .multiplier(4.0);
    let op = Flaky::new(u32::MAX, GenError::network("down"));
    let start = Instant::now();

    let _ = with_retry(&config, "test", || op.call()).await;

    // 1s, then 4s/16s/64s capped to 3s each.
    assert_elapsed(start, Duration::from_secs(1 + 3 + 3 + 3));
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_replaces_computed_delay() {
    let op = Flaky::new(1, GenError::rate_limited(Some(Duration::from_secs(7))));
    let start = Instant::now();

    let value = with_retry(&RetryConfig::default(), "test", || op.call())
        .await
        .unwrap();

    assert_eq!(value, "done");
    assert_elapsed(start, Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn success_on_first_try_does_not_sleep() {
    let op = Flaky::new(0, GenError::network("unused"));
    let start = Instant::now();
    with_retry(&RetryConfig::default(), "test", || op.call())
        .await
        .unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}
