//! Tests for the execution coordinator: cache bypass, no negative caching,
//! metrics recording and degraded cache behaviour.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use genexec::{
    CacheBackend, CacheError, CacheKey, ErrorKind, ExecutionCoordinator, GenError,
    GenerationRequest, GenerationResult, MemoryCache, MetricRecord, MetricsSink, RetryConfig,
    RunOptions,
};
use serde_json::json;

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<MetricRecord>>,
}

impl CollectingSink {
    fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl MetricsSink for CollectingSink {
    fn record(&self, record: &MetricRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Backend whose every operation fails.
struct BrokenCache;

#[async_trait]
impl CacheBackend for BrokenCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<GenerationResult>, CacheError> {
        Err(CacheError("connection refused".into()))
    }
    async fn set(&self, _key: &CacheKey, _value: GenerationResult, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError("connection refused".into()))
    }
    async fn delete(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Err(CacheError("connection refused".into()))
    }
    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError("connection refused".into()))
    }
}

struct Harness {
    coordinator: ExecutionCoordinator,
    cache: Arc<MemoryCache>,
    sink: Arc<CollectingSink>,
}

fn harness() -> Harness {
    let cache = Arc::new(MemoryCache::new(100));
    let sink = Arc::new(CollectingSink::default());
    let coordinator = ExecutionCoordinator::new(cache.clone())
        .metrics(sink.clone())
        .retry(
            RetryConfig::new()
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(2)),
        );
    Harness {
        coordinator,
        cache,
        sink,
    }
}

fn sunset() -> GenerationRequest {
    GenerationRequest::new("p", "m", "sunset").param("size", "1024x1024")
}

fn image(url: &str) -> GenerationResult {
    GenerationResult::success().field("url", url)
}

// =========================================================================
// Cache behaviour
// =========================================================================

#[tokio::test]
async fn cache_hit_never_invokes_provider() {
    let h = harness();
    let request = sunset();
    h.cache
        .set(&CacheKey::for_request(&request), image("https://cdn/cached.png"), Duration::from_secs(60))
        .await
        .unwrap();
    let calls = AtomicU32::new(0);

    let outcome = h
        .coordinator
        .run(&request, &RunOptions::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, GenError>(image("https://cdn/fresh.png")) }
        })
        .await
        .unwrap();

    assert!(outcome.cached);
    assert_eq!(outcome.result.get("url"), Some(&json!("https://cdn/cached.png")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let h = harness();
    let request = sunset();
    let calls = AtomicU32::new(0);
    let call = |_: &GenerationRequest| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, GenError>(image("https://x/1.png")) }
    };

    let first = h.coordinator.run(&request, &RunOptions::default(), call).await.unwrap();
    let second = h.coordinator.run(&request, &RunOptions::default(), call).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.result, second.result);
    assert_eq!(second.result.get("url"), Some(&json!("https://x/1.png")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_are_never_cached() {
    let h = harness();
    let request = sunset();

    let err = h
        .coordinator
        .run(&request, &RunOptions::default(), |_| async {
            Err::<GenerationResult, _>(GenError::invalid_parameters("bad size"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParameters);
    assert!(err.elapsed.is_some());
    assert!(h.cache.is_empty());

    let outcome = h
        .coordinator
        .run(&request, &RunOptions::default(), |_| async {
            Ok::<_, GenError>(image("https://x/ok.png"))
        })
        .await
        .unwrap();
    assert!(!outcome.cached);
}

#[tokio::test]
async fn unsuccessful_results_are_returned_but_not_cached() {
    let h = harness();
    let request = sunset();
    let mut soft_failure = GenerationResult::from_payload(json!({ "reason": "filtered" }));
    soft_failure.success = false;

    let outcome = h
        .coordinator
        .run(&request, &RunOptions::default(), |_| {
            let r = soft_failure.clone();
            async move { Ok::<_, GenError>(r) }
        })
        .await
        .unwrap();

    assert!(!outcome.result.success);
    assert!(h.cache.is_empty());
    assert!(!h.sink.records()[0].success);
}

#[tokio::test]
async fn disabled_cache_is_neither_read_nor_written() {
    let h = harness();
    let request = sunset();
    h.cache
        .set(&CacheKey::for_request(&request), image("stale"), Duration::from_secs(60))
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .run(&request, &RunOptions::no_cache(), |_| async {
            Ok::<_, GenError>(image("fresh"))
        })
        .await
        .unwrap();

    assert!(!outcome.cached);
    assert_eq!(outcome.result.get("url"), Some(&json!("fresh")));
    let stored = h.cache.get_entry(&CacheKey::for_request(&request)).unwrap();
    assert_eq!(stored.get("url"), Some(&json!("stale")));
}

#[tokio::test]
async fn huge_ttl_still_returns_and_caches_result() {
    let h = harness();
    let request = sunset();
    let options = RunOptions::new().ttl(Duration::from_secs(i64::MAX as u64));

    let outcome = h
        .coordinator
        .run(&request, &options, |_| async { Ok::<_, GenError>(image("a")) })
        .await
        .unwrap();

    assert!(!outcome.cached);
    assert_eq!(
        h.cache.get_entry(&CacheKey::for_request(&request)),
        Some(image("a"))
    );
}

#[tokio::test]
async fn ttl_option_applies_to_new_entries() {
    let h = harness();
    let request = sunset();
    let options = RunOptions::new().ttl(Duration::from_millis(1));

    h.coordinator
        .run(&request, &options, |_| async { Ok::<_, GenError>(image("a")) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.cache.get_entry(&CacheKey::for_request(&request)).is_none());
}

#[tokio::test]
async fn invalidate_forces_fresh_call() {
    let h = harness();
    let request = sunset();
    let calls = AtomicU32::new(0);
    let call = |_: &GenerationRequest| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, GenError>(image("a")) }
    };

    h.coordinator.run(&request, &RunOptions::default(), call).await.unwrap();
    h.coordinator.invalidate(&request).await;
    let again = h.coordinator.run(&request, &RunOptions::default(), call).await.unwrap();

    assert!(!again.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =========================================================================
// Retry integration
// =========================================================================

#[tokio::test]
async fn transient_failure_is_retried_then_cached() {
    let h = harness();
    let request = sunset();
    let calls = AtomicU32::new(0);

    let outcome = h
        .coordinator
        .run(&request, &RunOptions::default(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(GenError::rate_limited(None))
                } else {
                    Ok(image("a"))
                }
            }
        })
        .await
        .unwrap();

    assert!(!outcome.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.len(), 1);
    assert_eq!(h.sink.records().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_return_last_error() {
    let h = harness();
    let calls = AtomicU32::new(0);

    let err = h
        .coordinator
        .run(&sunset(), &RunOptions::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<GenerationResult, _>(GenError::network("reset")) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test]
async fn one_record_per_call_with_outcome_flags() {
    let h = harness();
    let request = sunset();

    h.coordinator
        .run(&request, &RunOptions::default(), |_| async { Ok::<_, GenError>(image("a")) })
        .await
        .unwrap();
    h.coordinator
        .run(&request, &RunOptions::default(), |_| async { Ok::<_, GenError>(image("b")) })
        .await
        .unwrap();
    let _ = h
        .coordinator
        .run(&GenerationRequest::new("p", "m", "other"), &RunOptions::default(), |_| async {
            Err::<GenerationResult, _>(GenError::invalid_credentials("nope"))
        })
        .await;

    let records = h.sink.records();
    assert_eq!(records.len(), 3);

    assert_eq!((records[0].success, records[0].from_cache), (true, false));
    assert_eq!((records[1].success, records[1].from_cache), (true, true));
    assert_eq!((records[2].success, records[2].from_cache), (false, false));
    for record in &records {
        assert_eq!(record.provider, "p");
        assert_eq!(record.model, "m");
    }
}

// =========================================================================
// Degraded cache
// =========================================================================

#[tokio::test]
async fn broken_cache_degrades_to_provider_call() {
    let sink = Arc::new(CollectingSink::default());
    let coordinator = ExecutionCoordinator::new(Arc::new(BrokenCache)).metrics(sink.clone());
    let calls = AtomicU32::new(0);
    let call = |_: &GenerationRequest| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, GenError>(image("a")) }
    };

    let first = coordinator.run(&sunset(), &RunOptions::default(), call).await.unwrap();
    let second = coordinator.run(&sunset(), &RunOptions::default(), call).await.unwrap();

    assert!(!first.cached && !second.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(sink.records().iter().all(|r| r.success));

    // Failing delete is logged, not raised.
    coordinator.invalidate(&sunset()).await;
}
