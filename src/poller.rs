//! Asynchronous task polling.
//!
//! Many media providers accept a job, hand back a task id, and expect the
//! client to poll until the job finishes. [`TaskPoller`] drives that loop:
//!
//! ```text
//!   submit ──► PENDING ──► RUNNING ──► SUCCEEDED  (payload returned)
//!                 │  ▲         │  ▲
//!                 └──┘         └──┘ ──► FAILED    (TASK_FAILED raised)
//!
//!   no terminal state before the deadline          (TIMEOUT raised)
//! ```
//!
//! The first status check happens immediately; later checks are spaced by
//! the configured [`PollCadence`]. Retryable fetch failures (network blips,
//! 503s) are logged and retried on the next tick; fatal ones end the loop.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::GenError;
use crate::telemetry;
use crate::Result;
use crate::types::GenerationResult;

/// Default overall polling deadline.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

/// Default spacing between status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Normalised remote task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Running => 1,
            TaskState::Succeeded | TaskState::Failed => 2,
        }
    }

    /// Recognise the status vocabulary most providers share.
    ///
    /// Matching is case-insensitive; returns `None` for anything else.
    pub fn from_common(raw: &str) -> Option<Self> {
        let state = match raw.to_ascii_lowercase().as_str() {
            "pending" | "queued" | "in_queue" | "starting" | "submitted" | "waiting" => {
                TaskState::Pending
            }
            "running" | "processing" | "in_progress" | "generating" => TaskState::Running,
            "succeeded" | "success" | "completed" | "complete" | "done" | "finished" => {
                TaskState::Succeeded
            }
            "failed" | "failure" | "error" | "canceled" | "cancelled" | "expired" => {
                TaskState::Failed
            }
            _ => return None,
        };
        Some(state)
    }
}

/// Furthest state a task has reached. Never moves backwards.
#[derive(Debug, Clone, Copy)]
struct TaskProgress {
    state: TaskState,
}

impl TaskProgress {
    fn new() -> Self {
        Self {
            state: TaskState::Pending,
        }
    }

    fn advance(&mut self, reported: TaskState) -> TaskState {
        if reported.rank() >= self.state.rank() {
            self.state = reported;
        } else {
            debug!(current = ?self.state, ?reported, "ignoring backwards task state");
        }
        self.state
    }
}

/// Status side of a provider adapter, as used by the poller.
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    /// Provider name for logging/metrics.
    fn name(&self) -> &str;

    /// Fetch the raw status document for a task.
    async fn fetch_status(&self, task_id: &str) -> Result<Value>;

    /// Map a raw status document onto [`TaskState`].
    fn normalize(&self, status: &Value) -> TaskState;

    /// Extract the result from a succeeded status document.
    ///
    /// `None` means the provider reported success without the expected
    /// payload.
    fn extract_payload(&self, status: &Value) -> Option<GenerationResult>;

    /// Human-readable reason from a failed status document.
    fn failure_reason(&self, _status: &Value) -> Option<String> {
        None
    }
}

/// Spacing between status fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollCadence {
    /// Same interval throughout.
    Fixed(Duration),
    /// 5s for the first 30s, 10s until 2 minutes, 15s afterwards.
    Stepped,
}

impl PollCadence {
    /// Interval to wait before the next fetch, given time since submission.
    pub fn interval_at(&self, elapsed: Duration) -> Duration {
        match *self {
            PollCadence::Fixed(interval) => interval,
            PollCadence::Stepped if elapsed < Duration::from_secs(30) => Duration::from_secs(5),
            PollCadence::Stepped if elapsed < Duration::from_secs(120) => {
                Duration::from_secs(10)
            }
            PollCadence::Stepped => Duration::from_secs(15),
        }
    }
}

impl Default for PollCadence {
    fn default() -> Self {
        PollCadence::Fixed(DEFAULT_POLL_INTERVAL)
    }
}

/// Configuration for the task poller.
///
/// ```rust
/// # use genexec::{PollConfig, PollCadence};
/// # use std::time::Duration;
/// let config = PollConfig::new()
///     .timeout(Duration::from_secs(300))
///     .cadence(PollCadence::Stepped);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Overall deadline measured from the start of polling. Default: 10 minutes.
    pub timeout: Duration,
    /// Spacing between fetches. Default: fixed 5s.
    pub cadence: PollCadence,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
            cadence: PollCadence::default(),
        }
    }
}

impl PollConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cadence(mut self, cadence: PollCadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Shorthand for a fixed cadence.
    pub fn interval(self, interval: Duration) -> Self {
        self.cadence(PollCadence::Fixed(interval))
    }
}

/// Drives a submitted task to a terminal state.
#[derive(Debug, Clone, Default)]
pub struct TaskPoller {
    config: PollConfig,
}

impl TaskPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `task_id` until it succeeds, fails, or the deadline passes.
    ///
    /// - `SUCCEEDED` returns the extracted payload; a missing payload is a
    ///   `TASK_FAILED` error.
    /// - `FAILED` raises `TASK_FAILED` with the provider's reason.
    /// - No terminal state before `timeout` raises `TIMEOUT`.
    #[instrument(skip(self, source), fields(provider = source.name()))]
    pub async fn poll(
        &self,
        task_id: &str,
        source: &dyn TaskStatusSource,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let timeout = self.config.timeout;
        let mut progress = TaskProgress::new();
        let mut polls: u32 = 0;

        while start.elapsed() < timeout {
            if polls > 0 {
                let elapsed = start.elapsed();
                let interval = self.config.cadence.interval_at(elapsed);
                tokio::time::sleep(interval.min(timeout.saturating_sub(elapsed))).await;
            }
            polls += 1;
            metrics::counter!(telemetry::POLL_TICKS_TOTAL, "provider" => source.name().to_owned())
                .increment(1);

            let status = match source.fetch_status(task_id).await {
                Ok(status) => status,
                Err(e) if e.is_retryable() => {
                    warn!(task_id, poll = polls, error = %e, "status fetch failed, will retry");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match progress.advance(source.normalize(&status)) {
                TaskState::Succeeded => {
                    debug!(task_id, polls, "task succeeded");
                    return source.extract_payload(&status).ok_or_else(|| {
                        GenError::task_failed(format!(
                            "task {task_id} succeeded without a result payload"
                        ))
                        .with_details(status)
                    });
                }
                TaskState::Failed => {
                    let reason = source
                        .failure_reason(&status)
                        .unwrap_or_else(|| "task failed without a reason".to_string());
                    return Err(GenError::task_failed(reason)
                        .with_details(json!({ "task_id": task_id })));
                }
                state => debug!(task_id, poll = polls, ?state, "task not finished"),
            }
        }

        Err(GenError::timeout(format!(
            "task {task_id} did not finish within {}s",
            timeout.as_secs_f64()
        ))
        .with_details(json!({
            "task_id": task_id,
            "last_state": progress.state,
            "polls": polls,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn common_vocabulary() {
        assert_eq!(TaskState::from_common("IN_QUEUE"), Some(TaskState::Pending));
        assert_eq!(TaskState::from_common("processing"), Some(TaskState::Running));
        assert_eq!(TaskState::from_common("Completed"), Some(TaskState::Succeeded));
        assert_eq!(TaskState::from_common("canceled"), Some(TaskState::Failed));
        assert_eq!(TaskState::from_common("mystery"), None);
    }

    #[test]
    fn progress_never_moves_backwards() {
        let mut progress = TaskProgress::new();
        assert_eq!(progress.advance(TaskState::Running), TaskState::Running);
        assert_eq!(progress.advance(TaskState::Pending), TaskState::Running);
        assert_eq!(progress.advance(TaskState::Succeeded), TaskState::Succeeded);
    }

    #[test]
    fn stepped_cadence() {
        let cadence = PollCadence::Stepped;
        assert_eq!(cadence.interval_at(Duration::ZERO), Duration::from_secs(5));
        assert_eq!(cadence.interval_at(Duration::from_secs(29)), Duration::from_secs(5));
        assert_eq!(cadence.interval_at(Duration::from_secs(30)), Duration::from_secs(10));
        assert_eq!(cadence.interval_at(Duration::from_secs(119)), Duration::from_secs(10));
        assert_eq!(cadence.interval_at(Duration::from_secs(120)), Duration::from_secs(15));
    }

    #[test]
    fn fixed_cadence_ignores_elapsed() {
        let cadence = PollCadence::Fixed(Duration::from_millis(250));
        assert_eq!(cadence.interval_at(Duration::from_secs(500)), Duration::from_millis(250));
    }
}
