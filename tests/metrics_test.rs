//! Tests for the `metrics` facade output.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture what the
//! coordinator, retry engine and poller emit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use genexec::telemetry;
use genexec::{
    CacheBackend, CacheError, CacheKey, ExecutionCoordinator, GenError, GenerationRequest,
    GenerationResult, MemoryCache, RetryConfig, RunOptions,
};

// ============================================================================
// Snapshot helpers
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum counter values for `name`, optionally restricted to one label value.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| match label {
            Some((k, v)) => key.key().labels().any(|l| l.key() == k && l.value() == v),
            None => true,
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Drive `work` under a local recorder and return the snapshot.
///
/// `block_in_place` keeps the sync `with_local_recorder` closure on the
/// current thread while `block_on` drives the async work.
fn capture<F: Future>(work: F) -> SnapshotVec {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(work))
    });
    snapshotter.snapshot().into_vec()
}

fn coordinator() -> ExecutionCoordinator {
    ExecutionCoordinator::new(Arc::new(MemoryCache::new(16))).retry(
        RetryConfig::new()
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(1)),
    )
}

fn request() -> GenerationRequest {
    GenerationRequest::new("acme", "flux", "sunset")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn miss_then_hit_records_two_requests() {
    let coordinator = coordinator();
    let snapshot = capture(async {
        for _ in 0..2 {
            coordinator
                .run(&request(), &RunOptions::default(), |_| async {
                    Ok::<_, GenError>(GenerationResult::success().field("url", "u"))
                })
                .await
                .unwrap();
        }
    });

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL, None), 2);
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("cache", "hit"))),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, None), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL, None), 1);
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failure_records_error_status_and_retries() {
    let coordinator = coordinator();
    let snapshot = capture(async {
        let _ = coordinator
            .run(&request(), &RunOptions::default(), |_| async {
                Err::<GenerationResult, _>(GenError::service_unavailable("busy"))
            })
            .await;
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "error"))),
        1
    );
    // Three attempts, two retries.
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::RETRIES_TOTAL,
            Some(("kind", "SERVICE_UNAVAILABLE"))
        ),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_read_failure_is_counted() {
    struct Unreachable;

    #[async_trait::async_trait]
    impl CacheBackend for Unreachable {
        async fn get(&self, _: &CacheKey) -> Result<Option<GenerationResult>, CacheError> {
            Err(CacheError("down".into()))
        }
        async fn set(&self, _: &CacheKey, _: GenerationResult, _: Duration) -> Result<(), CacheError> {
            Err(CacheError("down".into()))
        }
        async fn delete(&self, _: &CacheKey) -> Result<(), CacheError> {
            Ok(())
        }
        async fn clear(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    let coordinator = ExecutionCoordinator::new(Arc::new(Unreachable));
    let snapshot = capture(async {
        coordinator
            .run(&request(), &RunOptions::default(), |_| async {
                Ok::<_, GenError>(GenerationResult::success())
            })
            .await
            .unwrap();
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_ERRORS_TOTAL, Some(("operation", "get"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_ERRORS_TOTAL, Some(("operation", "set"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "ok"))),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    coordinator()
        .run(&request(), &RunOptions::default(), |_| async {
            Ok::<_, GenError>(GenerationResult::success())
        })
        .await
        .unwrap();
}
