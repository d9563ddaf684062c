//! Web searcher trait for evidence discovery.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ProviderResult;

/// One search request issued by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,

    /// Maximum results to return
    pub limit: usize,

    /// Only sources published on or after this date
    pub published_after: Option<NaiveDate>,

    /// Restrict results to these domains (empty = whole web)
    #[serde(default)]
    pub include_domains: Vec<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
            published_after: None,
            include_domains: Vec::new(),
        }
    }

    pub fn published_after(mut self, date: NaiveDate) -> Self {
        self.published_after = Some(date);
        self
    }

    pub fn with_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Stable text used as the cache discriminator.
    pub fn cache_discriminator(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.text.trim().to_lowercase(),
            self.limit,
            self.published_after
                .map(|d| d.to_string())
                .unwrap_or_default(),
            self.include_domains.join(",")
        )
    }
}

/// A discovered URL from web search with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: Url,

    pub title: Option<String>,

    /// Snippet/description from search results.
    pub snippet: Option<String>,

    /// Provider relevance score (0.0-1.0, if provided by search API).
    pub score: Option<f32>,

    pub published_date: Option<NaiveDate>,
}

impl SearchResult {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: None,
            snippet: None,
            score: None,
            published_date: None,
        }
    }

    /// Create from a URL string.
    pub fn from_url(url: &str) -> Option<Self> {
        Url::parse(url).ok().map(Self::new)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_published_date(mut self, date: NaiveDate) -> Self {
        self.published_date = Some(date);
        self
    }
}

/// Web search trait for open-world evidence discovery.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<SearchResult>>;
}
