//! Generation results and the tagged outcome returned to callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A provider's answer to a generation request.
///
/// Only `success == true` results are ever cached; the remaining fields are
/// provider specific (output URLs, seeds, task ids, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl GenerationResult {
    /// A successful result with no fields yet.
    pub fn success() -> Self {
        Self {
            success: true,
            fields: Map::new(),
        }
    }

    /// Build a successful result from a provider payload.
    ///
    /// Objects are flattened into the result fields; any other JSON value is
    /// stored under `output`.
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::Object(mut fields) => {
                fields.remove("success");
                Self {
                    success: true,
                    fields,
                }
            }
            other => Self::success().field("output", other),
        }
    }

    /// Add a provider-specific field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a provider-specific field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether this result may be stored in the result cache.
    pub fn is_cacheable(&self) -> bool {
        self.success
    }
}

/// What [`ExecutionCoordinator::run`](crate::ExecutionCoordinator::run) hands back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutcome {
    #[serde(flatten)]
    pub result: GenerationResult,
    /// `true` when served from the result cache without calling the provider.
    pub cached: bool,
    #[serde(skip)]
    pub duration: Duration,
}
