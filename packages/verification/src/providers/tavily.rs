//! Tavily-backed web searcher.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::check_status;
use crate::error::ProviderResult;
use crate::pipeline::sanitize::parse_date;
use crate::security::SecretString;
use crate::traits::searcher::{SearchQuery, SearchResult, WebSearcher};

/// Web search through the Tavily API.
///
/// Date-bounded queries use Tavily's `start_date` filter and
/// domain-restricted queries use `include_domains`.
pub struct TavilySearcher {
    api_key: SecretString,
    client: reqwest::Client,
    search_depth: String,
    base_url: String,
}

impl TavilySearcher {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            client: reqwest::Client::new(),
            search_depth: "basic".to_string(),
            base_url: "https://api.tavily.com".to_string(),
        }
    }

    /// Use Tavily's "advanced" depth (slower, better snippets).
    pub fn advanced(mut self) -> Self {
        self.search_depth = "advanced".to_string();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Serialize)]
struct Request<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "no_domains")]
    include_domains: &'a [String],
}

fn no_domains(domains: &&[String]) -> bool {
    domains.is_empty()
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
    score: Option<f32>,
    published_date: Option<String>,
}

impl TavilyResult {
    fn into_search_result(self) -> Option<SearchResult> {
        let mut result = SearchResult::new(Url::parse(&self.url).ok()?);
        if let Some(title) = self.title {
            result = result.with_title(title);
        }
        if let Some(content) = self.content {
            result = result.with_snippet(content);
        }
        if let Some(score) = self.score {
            result = result.with_score(score);
        }
        if let Some(date) = self.published_date.as_deref().and_then(parse_date) {
            result = result.with_published_date(date);
        }
        Some(result)
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<SearchResult>> {
        let request = Request {
            query: &query.text,
            search_depth: &self.search_depth,
            max_results: query.limit,
            start_date: query.published_after.map(|d: NaiveDate| d.format("%Y-%m-%d").to_string()),
            include_domains: &query.include_domains,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await?;
        let response: Response = check_status(response).await?.json().await?;

        let results: Vec<SearchResult> = response
            .results
            .into_iter()
            .filter_map(TavilyResult::into_search_result)
            .take(query.limit)
            .collect();

        debug!(query = %query.text, results = results.len(), "Tavily search completed");
        Ok(results)
    }
}
