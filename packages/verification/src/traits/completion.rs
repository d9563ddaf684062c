//! Language-model completion trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// A structured-output completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,

    /// Name of the output schema (also used to route mock responses)
    pub schema_name: String,

    /// JSON schema the output must satisfy
    pub schema: serde_json::Value,
}

impl CompletionRequest {
    pub fn new(
        system: impl Into<String>,
        prompt: impl Into<String>,
        schema_name: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            schema_name: schema_name.into(),
            schema,
        }
    }
}

/// Completion model constrained to a JSON schema.
///
/// Returns the raw JSON text; callers re-parse it into their strict types.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String>;
}
