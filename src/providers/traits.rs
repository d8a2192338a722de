//! Provider adapter trait.
//!
//! An adapter turns a [`GenerationRequest`] into a provider call. Providers
//! that answer synchronously return [`Submission::Completed`]; asynchronous
//! ones return [`Submission::Task`] and expose their status side through
//! [`ProviderAdapter::status_source`] so the [`TaskPoller`] can finish the job.
//!
//! # Example
//!
//! ```ignore
//! async fn submit(&self, request: &GenerationRequest) -> Result<Submission> {
//!     let id = self.client.create_job(request).await?;
//!     Ok(Submission::Task(id))
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::error::GenError;
use crate::poller::{TaskPoller, TaskStatusSource};
use crate::types::{GenerationRequest, GenerationResult};

/// What a provider hands back when a request is submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The job was accepted; poll this task id for the result.
    Task(String),
    /// The provider answered directly.
    Completed(GenerationResult),
}

/// Per-provider integration.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for logging/metrics.
    fn name(&self) -> &str;

    /// Submit a generation request.
    async fn submit(&self, request: &GenerationRequest) -> Result<Submission>;

    /// Status side for task-based providers. `None` for synchronous ones.
    fn status_source(&self) -> Option<&dyn TaskStatusSource> {
        None
    }
}

/// Run one provider call to completion: submit, then poll if needed.
///
/// This is the `provider_call` the coordinator retries; a poll timeout
/// therefore leads to a fresh submission on the next attempt.
pub async fn call_provider(
    adapter: &dyn ProviderAdapter,
    poller: &TaskPoller,
    request: &GenerationRequest,
) -> Result<GenerationResult> {
    match adapter.submit(request).await? {
        Submission::Completed(result) => Ok(result),
        Submission::Task(task_id) => match adapter.status_source() {
            Some(source) => poller.poll(&task_id, source).await,
            None => Err(GenError::unknown(format!(
                "provider {} returned task {task_id} but cannot be polled",
                adapter.name()
            ))),
        },
    }
}
