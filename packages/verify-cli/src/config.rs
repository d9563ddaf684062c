use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::Path;
use verification::PipelineConfig;

/// Provider settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: Option<String>,
    pub tavily_api_key: String,
    pub search_requests_per_second: u32,
    pub nli_endpoint: String,
    pub nli_token: Option<String>,
    pub ocr_endpoint: Option<String>,
    pub transcript_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_model: env::var("OPENAI_MODEL").ok(),
            tavily_api_key: env::var("TAVILY_API_KEY").context("TAVILY_API_KEY must be set")?,
            search_requests_per_second: env::var("SEARCH_REQUESTS_PER_SECOND")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("SEARCH_REQUESTS_PER_SECOND must be a valid number")?,
            nli_endpoint: env::var("NLI_ENDPOINT").context("NLI_ENDPOINT must be set")?,
            nli_token: env::var("NLI_TOKEN").ok(),
            ocr_endpoint: env::var("OCR_ENDPOINT").ok(),
            transcript_endpoint: env::var("TRANSCRIPT_ENDPOINT").ok(),
        })
    }
}

/// Pipeline tunables, from a JSON file when given. Missing fields keep
/// their defaults.
pub fn load_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid pipeline config in {}", path.display()))
}
