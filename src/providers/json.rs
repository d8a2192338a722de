//! Configurable JSON-over-HTTP provider.
//!
//! Most media APIs follow one of two shapes:
//!
//! - **task**: `POST {submit_path}` returns a task id, `GET {status_path}`
//!   returns a status document that eventually carries the output.
//! - **sync**: `POST {submit_path}` returns the output directly.
//!
//! [`JsonProvider`] covers both, locating the task id, status, payload and
//! error inside the response documents with JSON pointers (RFC 6901).
//!
//! ```toml
//! [providers.acme]
//! mode = "task"
//! base_url = "https://api.acme.test/v1"
//! submit_path = "/videos"
//! status_path = "/videos/{task_id}"
//! api_key_env = "ACME_API_KEY"
//! payload_pointer = "/result"
//! status_map = { "IN_QUEUE" = "PENDING" }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::http::{HttpRequest, HttpTransport};
use super::traits::{ProviderAdapter, Submission};
use crate::Result;
use crate::error::GenError;
use crate::poller::{TaskState, TaskStatusSource};
use crate::types::{GenerationRequest, GenerationResult};

/// Request/response shape of a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Submit, then poll.
    #[default]
    Task,
    /// Single request/response.
    Sync,
}

/// Definition of one JSON provider, usually read from `[providers.<name>]`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonProviderConfig {
    #[serde(default)]
    pub mode: ProviderMode,
    pub base_url: String,
    #[serde(default = "default_submit_path")]
    pub submit_path: String,
    /// Status endpoint; `{task_id}` is substituted. Required in task mode.
    #[serde(default)]
    pub status_path: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    /// Prefix placed before the key; empty sends the bare key.
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    #[serde(default = "default_task_id_pointer")]
    pub task_id_pointer: String,
    #[serde(default = "default_status_pointer")]
    pub status_pointer: String,
    #[serde(default = "default_payload_pointer")]
    pub payload_pointer: String,
    #[serde(default = "default_error_pointer")]
    pub error_pointer: String,
    /// Raw status string → state, consulted before the common vocabulary.
    #[serde(default)]
    pub status_map: HashMap<String, TaskState>,
    /// Accepted models; empty accepts any.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_submit_path() -> String {
    "/generations".to_string()
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

fn default_task_id_pointer() -> String {
    "/id".to_string()
}

fn default_status_pointer() -> String {
    "/status".to_string()
}

fn default_payload_pointer() -> String {
    "/output".to_string()
}

fn default_error_pointer() -> String {
    "/error".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl JsonProviderConfig {
    /// Minimal task-mode config with default pointers.
    pub fn task(base_url: impl Into<String>, status_path: impl Into<String>) -> Self {
        Self {
            mode: ProviderMode::Task,
            base_url: base_url.into(),
            submit_path: default_submit_path(),
            status_path: Some(status_path.into()),
            api_key_env: None,
            auth_header: default_auth_header(),
            auth_scheme: default_auth_scheme(),
            task_id_pointer: default_task_id_pointer(),
            status_pointer: default_status_pointer(),
            payload_pointer: default_payload_pointer(),
            error_pointer: default_error_pointer(),
            status_map: HashMap::new(),
            models: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Minimal sync-mode config with default pointers.
    pub fn sync(base_url: impl Into<String>) -> Self {
        Self {
            mode: ProviderMode::Sync,
            status_path: None,
            ..Self::task(base_url, "")
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        if self.mode == ProviderMode::Task {
            match &self.status_path {
                Some(path) if path.contains("{task_id}") => {}
                Some(_) => return Err("status_path must contain {task_id}".to_string()),
                None => return Err("task mode requires status_path".to_string()),
            }
        }
        for pointer in [
            &self.task_id_pointer,
            &self.status_pointer,
            &self.payload_pointer,
            &self.error_pointer,
        ] {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(format!("invalid JSON pointer '{pointer}'"));
            }
        }
        Ok(())
    }
}

/// Provider adapter driven entirely by a [`JsonProviderConfig`].
pub struct JsonProvider {
    name: String,
    config: JsonProviderConfig,
    api_key: Option<String>,
    transport: Arc<dyn HttpTransport>,
}

impl JsonProvider {
    pub fn new(
        name: impl Into<String>,
        config: JsonProviderConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            api_key: None,
            transport,
        }
    }

    /// Set the API key sent with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn config(&self) -> &JsonProviderConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Status URL for `task_id`, encoded as a single path segment.
    fn status_url(&self, task_id: &str) -> Result<String> {
        let path = self
            .config
            .status_path
            .as_deref()
            .ok_or_else(|| GenError::unknown(format!("{} has no status_path", self.name)))?
            .replace("{task_id}", &urlencoding::encode(task_id));
        Ok(self.url(&path))
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        let request = request.timeout(Duration::from_secs(self.config.request_timeout_secs));
        match &self.api_key {
            Some(key) if self.config.auth_scheme.is_empty() => {
                request.header(&self.config.auth_header, key)
            }
            Some(key) => request.header(
                &self.config.auth_header,
                format!("{} {key}", self.config.auth_scheme),
            ),
            None => request,
        }
    }

    fn request_body(request: &GenerationRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), Value::String(request.model.clone()));
        body.insert("prompt".into(), Value::String(request.prompt.clone()));
        for (name, value) in &request.parameters {
            body.insert(name.clone(), value.to_json());
        }
        Value::Object(body)
    }

    fn lookup<'a>(document: &'a Value, pointer: &str) -> Option<&'a Value> {
        document.pointer(pointer).filter(|v| !v.is_null())
    }

    fn task_id(&self, document: &Value) -> Option<String> {
        match Self::lookup(document, &self.config.task_id_pointer)? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn payload(&self, document: &Value) -> Option<GenerationResult> {
        Self::lookup(document, &self.config.payload_pointer)
            .cloned()
            .map(GenerationResult::from_payload)
    }
}

#[async_trait]
impl ProviderAdapter for JsonProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission> {
        if !self.config.models.is_empty() && !self.config.models.contains(&request.model) {
            return Err(GenError::invalid_model(&request.model));
        }

        let http = self.authorize(HttpRequest::post(
            self.url(&self.config.submit_path),
            Self::request_body(request),
        ));
        let response = self.transport.send(http).await?;
        let document = response.body;

        if self.config.mode == ProviderMode::Sync {
            return self.payload(&document).map(Submission::Completed).ok_or_else(|| {
                GenError::task_failed(format!("{} response carried no result payload", self.name))
                    .with_details(document)
            });
        }

        // Some task APIs finish fast enough to answer inline.
        if Self::lookup(&document, &self.config.status_pointer).is_some()
            && self.normalize(&document) == TaskState::Succeeded
            && let Some(result) = self.payload(&document)
        {
            debug!(provider = %self.name, "task completed on submission");
            return Ok(Submission::Completed(result));
        }

        self.task_id(&document).map(Submission::Task).ok_or_else(|| {
            GenError::task_failed(format!("{} accepted the job without a task id", self.name))
                .with_details(document)
        })
    }

    fn status_source(&self) -> Option<&dyn TaskStatusSource> {
        match self.config.mode {
            ProviderMode::Task => Some(self),
            ProviderMode::Sync => None,
        }
    }
}

#[async_trait]
impl TaskStatusSource for JsonProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_status(&self, task_id: &str) -> Result<Value> {
        let url = self.status_url(task_id)?;
        let response = self
            .transport
            .send(self.authorize(HttpRequest::get(url)))
            .await?;
        Ok(response.body)
    }

    fn normalize(&self, status: &Value) -> TaskState {
        let Some(raw) = Self::lookup(status, &self.config.status_pointer).and_then(Value::as_str)
        else {
            return TaskState::Running;
        };
        if let Some(state) = self.config.status_map.get(raw) {
            return *state;
        }
        if let Some((_, state)) = self
            .config
            .status_map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(raw))
        {
            return *state;
        }
        TaskState::from_common(raw).unwrap_or_else(|| {
            debug!(provider = %self.name, raw, "unrecognised task status, treating as running");
            TaskState::Running
        })
    }

    fn extract_payload(&self, status: &Value) -> Option<GenerationResult> {
        self.payload(status)
    }

    fn failure_reason(&self, status: &Value) -> Option<String> {
        let error = Self::lookup(status, &self.config.error_pointer)?;
        let reason = match error {
            Value::String(s) => s.clone(),
            Value::Object(obj) => match obj.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => error.to_string(),
            },
            other => other.to_string(),
        };
        Some(reason)
    }
}
