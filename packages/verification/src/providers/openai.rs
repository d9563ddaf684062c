//! OpenAI chat completions (structured output) and embeddings.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::check_status;
use crate::error::{ProviderError, ProviderResult};
use crate::security::SecretString;
use crate::traits::completion::{CompletionModel, CompletionRequest};
use crate::traits::embedder::Embedder;

/// OpenAI client used for both the claim extractor/judge and embeddings.
///
/// ```rust,ignore
/// let openai = OpenAi::new(api_key).with_model("gpt-4o-mini");
/// let raw = openai.complete(&request).await?;
/// ```
#[derive(Clone)]
pub struct OpenAi {
    client: Client,
    api_key: SecretString,
    model: String,
    embedding_model: String,
    base_url: String,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::new(api_key),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> ProviderResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait]
impl CompletionModel for OpenAi {
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema_name,
                    strict: true,
                    schema: strict_schema(request.schema.clone()),
                },
            },
        };

        debug!(model = %self.model, schema = %request.schema_name, "OpenAI completion");
        let response: ChatResponse = self
            .post("chat/completions", &body)
            .await?
            .json()
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices returned".into()))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(ProviderError::Refused(refusal));
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::Refused("content filtered".into()));
        }

        choice
            .message
            .content
            .ok_or_else(|| ProviderError::InvalidResponse("empty completion".into()))
    }
}

#[async_trait]
impl Embedder for OpenAi {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> ProviderResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbeddingResponse = self.post("embeddings", &body).await?.json().await?;

        if response.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Adapt a generated JSON schema to strict structured-output rules: no
/// metadata keywords and closed objects.
fn strict_schema(mut schema: Value) -> Value {
    fn visit(value: &mut Value) {
        match value {
            Value::Object(map) => {
                map.remove("$schema");
                map.remove("title");
                map.remove("format");
                if map.get("type").and_then(Value::as_str) == Some("object") {
                    map.insert("additionalProperties".into(), Value::Bool(false));
                }
                map.values_mut().for_each(visit);
            }
            Value::Array(items) => items.iter_mut().for_each(visit),
            _ => {}
        }
    }
    visit(&mut schema);
    schema
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
