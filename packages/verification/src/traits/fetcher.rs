//! Content fetcher trait.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// A fetched page before sanitization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,

    /// Raw body (HTML or plain text)
    pub body: String,

    /// MIME type from the response, if any
    pub content_type: Option<String>,

    /// Best-effort publish date read from the page or its headers
    pub published_date: Option<NaiveDate>,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            content_type: None,
            published_date: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_published_date(mut self, date: NaiveDate) -> Self {
        self.published_date = Some(date);
        self
    }

    /// Whether the body should go through the HTML sanitizer.
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.contains("html"),
            None => self.body.trim_start().starts_with('<'),
        }
    }
}

/// Fetches a single URL.
///
/// Implementations must bound fetch time and response size and must honour
/// robots directives.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> ProviderResult<FetchedPage>;
}
