//! Telemetry metric names and the per-run metrics sink.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus,
//! statsd); without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `genexec_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name from the request
//! - `model`: model name from the request
//! - `status`: "ok" or "error"
//! - `cache`: "hit" or "miss"

use std::time::Duration;

/// Completed coordinator runs.
///
/// Labels: `provider`, `model`, `status` ("ok" | "error"), `cache` ("hit" | "miss").
pub const REQUESTS_TOTAL: &str = "genexec_requests_total";

/// Coordinator run duration in seconds.
///
/// Labels: `provider`, `model`.
pub const REQUEST_DURATION_SECONDS: &str = "genexec_request_duration_seconds";

/// Retry attempts (not counting the initial request).
///
/// Labels: `provider`, `kind`.
pub const RETRIES_TOTAL: &str = "genexec_retries_total";

/// Result cache hits.
///
/// Labels: `provider`.
pub const CACHE_HITS_TOTAL: &str = "genexec_cache_hits_total";

/// Result cache misses.
///
/// Labels: `provider`.
pub const CACHE_MISSES_TOTAL: &str = "genexec_cache_misses_total";

/// Cache backend failures (degraded to miss / skipped write).
///
/// Labels: `operation` ("get" | "set").
pub const CACHE_ERRORS_TOTAL: &str = "genexec_cache_errors_total";

/// Status fetches issued by the task poller.
///
/// Labels: `provider`.
pub const POLL_TICKS_TOTAL: &str = "genexec_poll_ticks_total";

/// One record per completed coordinator run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub provider: String,
    pub model: String,
    pub duration: Duration,
    pub success: bool,
    pub from_cache: bool,
}

/// Append-only destination for [`MetricRecord`]s.
pub trait MetricsSink: Send + Sync {
    fn record(&self, record: &MetricRecord);
}

/// Default sink: forwards records to the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetrySink;

impl MetricsSink for TelemetrySink {
    fn record(&self, record: &MetricRecord) {
        let status = if record.success { "ok" } else { "error" };
        let cache = if record.from_cache { "hit" } else { "miss" };
        metrics::counter!(REQUESTS_TOTAL,
            "provider" => record.provider.clone(),
            "model" => record.model.clone(),
            "status" => status,
            "cache" => cache,
        )
        .increment(1);
        metrics::histogram!(REQUEST_DURATION_SECONDS,
            "provider" => record.provider.clone(),
            "model" => record.model.clone(),
        )
        .record(record.duration.as_secs_f64());
    }
}
