//! Plain HTTP content fetcher with SSRF, robots.txt and size guards.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::check_status;
use super::robots::{fetch_robots, RobotsRules};
use crate::error::{ProviderError, ProviderResult};
use crate::pipeline::sanitize;
use crate::security::UrlPolicy;
use crate::traits::fetcher::{ContentFetcher, FetchedPage};

/// Fetches pages over HTTP(S).
///
/// Every URL is validated against a [`UrlPolicy`] after DNS resolution,
/// checked against the host's robots.txt (cached per origin), and read
/// under a byte limit.
///
/// ```rust,ignore
/// let fetcher = HttpFetcher::new(Duration::from_secs(3))?
///     .with_max_bytes(1024 * 1024);
/// let page = fetcher.fetch("https://example.com/article").await?;
/// ```
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    policy: UrlPolicy,
    max_bytes: u64,
    respect_robots: bool,
    robots: DashMap<String, Arc<RobotsRules>>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(ProviderError::http)?;

        Ok(Self {
            client,
            user_agent: "VerifyBot/0.1".to_string(),
            policy: UrlPolicy::default(),
            max_bytes: 2 * 1024 * 1024,
            respect_robots: true,
            robots: DashMap::new(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Skip robots.txt checks (for first-party URLs submitted by a user).
    pub fn ignore_robots(mut self) -> Self {
        self.respect_robots = false;
        self
    }

    async fn robots_for(&self, url: &url::Url) -> Arc<RobotsRules> {
        let origin = url.origin().ascii_serialization();
        if let Some(rules) = self.robots.get(&origin) {
            return rules.clone();
        }

        let rules = Arc::new(fetch_robots(&self.client, url).await);
        self.robots.insert(origin, rules.clone());
        rules
    }

    async fn read_limited(&self, mut response: reqwest::Response) -> ProviderResult<Vec<u8>> {
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(ProviderError::TooLarge {
                    size: length,
                    limit: self.max_bytes,
                });
            }
        }

        // Without a declared length, keep the first `max_bytes` and stop reading.
        let limit = self.max_bytes as usize;
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = limit - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!(limit = limit, "Response body truncated at byte limit");
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> ProviderResult<FetchedPage> {
        let parsed = self.policy.check_resolved(url).await?;

        if self.respect_robots {
            let rules = self.robots_for(&parsed).await;
            if !rules.is_allowed(&self.user_agent, parsed.path()) {
                warn!(url = %parsed, "robots.txt disallows fetch");
                return Err(ProviderError::Blocked(format!(
                    "robots.txt disallows {}",
                    parsed
                )));
            }
        }

        debug!(url = %parsed, "HTTP fetch starting");
        let response = self
            .client
            .get(parsed.as_str())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let response = check_status(response).await?;

        // Redirect targets must pass the same policy.
        let final_url = response.url().to_string();
        self.policy.check(&final_url)?;

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(reqwest::header::CONTENT_TYPE);
        let last_modified = header(reqwest::header::LAST_MODIFIED);

        let bytes = self.read_limited(response).await?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        let mut page = FetchedPage::new(final_url, body);
        if let Some(ct) = content_type {
            page = page.with_content_type(ct);
        }

        let declared = if page.is_html() {
            sanitize::published_date(&page.body)
        } else {
            None
        };
        if let Some(date) = declared.or_else(|| last_modified.as_deref().and_then(sanitize::parse_date)) {
            page = page.with_published_date(date);
        }

        debug!(
            url = %page.url,
            bytes = page.body.len(),
            published = ?page.published_date,
            "HTTP fetch completed"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_private_address_rejected_before_request() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:8080/admin").await;
        assert!(matches!(result, Err(ProviderError::Blocked(_))));
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch("file:///etc/passwd").await;
        assert!(matches!(result, Err(ProviderError::Blocked(_))));
    }
}
