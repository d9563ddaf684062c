//! Ingest stage: turn a check request into normalized plain text.
//!
//! Every input type ends in the same sanitizer, so the rest of the pipeline
//! sees one uniform trust boundary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::cache::CacheLayer;
use super::retry::RetryPolicy;
use super::sanitize::{published_date, sanitize};
use crate::error::{IngestError, ProviderError, ProviderResult};
use crate::traits::cache::CacheKind;
use crate::traits::fetcher::ContentFetcher;
use crate::traits::media::{OcrService, TranscriptService};
use crate::types::content::{hash_content, NormalizedContent};
use crate::types::request::{CheckRequest, InputType};

/// A fetched page reduced to plain text. Cached per URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedPage {
    pub url: String,
    pub text: String,
    pub published_date: Option<NaiveDate>,
}

/// Fetch + sanitize + cache path shared by ingest and evidence retrieval.
#[derive(Clone)]
pub struct PageLoader {
    fetcher: Arc<dyn ContentFetcher>,
    cache: CacheLayer,
    retry: RetryPolicy,
    max_bytes: u64,
}

impl PageLoader {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        cache: CacheLayer,
        retry: RetryPolicy,
        max_bytes: u64,
    ) -> Self {
        Self {
            fetcher,
            cache,
            retry,
            max_bytes,
        }
    }

    pub async fn load(&self, url: &str) -> ProviderResult<LoadedPage> {
        if let Some(page) = self.cache.get::<LoadedPage>(CacheKind::PageFetch, url).await {
            return Ok(page);
        }

        let fetched = self.retry.run("fetch", || self.fetcher.fetch(url)).await?;
        let size = fetched.body.len() as u64;
        if size > self.max_bytes {
            return Err(ProviderError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let declared_date = fetched.published_date.or_else(|| {
            if fetched.is_html() {
                published_date(&fetched.body)
            } else {
                None
            }
        });
        let page = LoadedPage {
            url: fetched.url.clone(),
            text: sanitize(&fetched.body),
            published_date: declared_date,
        };
        debug!(url = %url, chars = page.text.len(), "Page loaded");

        self.cache.put(CacheKind::PageFetch, url, &page).await;
        Ok(page)
    }
}

/// Stage 1: produce [`NormalizedContent`] for any input type.
pub struct Ingestor {
    pages: PageLoader,
    ocr: Arc<dyn OcrService>,
    transcripts: Arc<dyn TranscriptService>,
    cache: CacheLayer,
    retry: RetryPolicy,
    timeout: Duration,
    max_input_bytes: u64,
}

impl Ingestor {
    pub fn new(
        pages: PageLoader,
        ocr: Arc<dyn OcrService>,
        transcripts: Arc<dyn TranscriptService>,
        cache: CacheLayer,
        retry: RetryPolicy,
        timeout: Duration,
        max_input_bytes: u64,
    ) -> Self {
        Self {
            pages,
            ocr,
            transcripts,
            cache,
            retry,
            timeout,
            max_input_bytes,
        }
    }

    /// Normalize a request, serving repeated inputs from the cache.
    pub async fn ingest(&self, request: &CheckRequest) -> Result<NormalizedContent, IngestError> {
        let payload = request.input_payload.trim();
        let content_hash = hash_content(request.input_type.as_str(), payload);

        if let Some(content) = self
            .cache
            .get::<NormalizedContent>(CacheKind::Ingest, &content_hash)
            .await
        {
            info!(check_id = %request.id, "Ingest served from cache");
            return Ok(content);
        }

        let content = match tokio::time::timeout(
            self.timeout,
            self.normalize(request.input_type, payload, &content_hash),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(check_id = %request.id, "Ingest timed out");
                return Err(timeout_error(request.input_type, payload));
            }
        };

        self.cache
            .put(CacheKind::Ingest, &content_hash, &content)
            .await;
        Ok(content)
    }

    async fn normalize(
        &self,
        input_type: InputType,
        payload: &str,
        content_hash: &str,
    ) -> Result<NormalizedContent, IngestError> {
        let content = match input_type {
            InputType::Text => {
                let size = payload.len() as u64;
                if size > self.max_input_bytes {
                    return Err(IngestError::ContentTooLarge {
                        size,
                        limit: self.max_input_bytes,
                    });
                }
                NormalizedContent::new(sanitize(payload), content_hash)
            }
            InputType::Url => {
                let url = web_url(payload)?;
                let page = self.pages.load(&url).await.map_err(|e| match e {
                    ProviderError::TooLarge { size, limit } => {
                        IngestError::ContentTooLarge { size, limit }
                    }
                    source => IngestError::FetchFailed {
                        url: url.clone(),
                        source,
                    },
                })?;
                NormalizedContent::new(page.text, content_hash)
                    .with_source_url(url)
                    .with_published_date(page.published_date)
            }
            InputType::Image => {
                let text = self
                    .retry
                    .run("ocr", || self.ocr.extract_text(payload))
                    .await
                    .map_err(|e| IngestError::ExtractionFailed(format!("OCR failed: {}", e)))?;
                NormalizedContent::new(sanitize(&text), content_hash)
            }
            InputType::Video => {
                let url = web_url(payload)?;
                let transcript = self
                    .retry
                    .run("transcript", || self.transcripts.fetch_transcript(&url))
                    .await
                    .map_err(|source| IngestError::FetchFailed {
                        url: url.clone(),
                        source,
                    })?
                    .ok_or_else(|| {
                        IngestError::UnsupportedInput(
                            "video has no caption or transcript track".to_string(),
                        )
                    })?;
                NormalizedContent::new(sanitize(&transcript), content_hash).with_source_url(url)
            }
        };

        if content.source_text.is_empty() {
            return Err(IngestError::ExtractionFailed(format!(
                "no text could be recovered from {} input",
                input_type.as_str()
            )));
        }

        Ok(content)
    }
}

fn web_url(payload: &str) -> Result<String, IngestError> {
    let parsed = url::Url::parse(payload)
        .map_err(|e| IngestError::UnsupportedInput(format!("invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(IngestError::UnsupportedInput(format!(
            "unsupported URL scheme: {}",
            other
        ))),
    }
}

fn timeout_error(input_type: InputType, payload: &str) -> IngestError {
    match input_type {
        InputType::Url | InputType::Video => IngestError::FetchFailed {
            url: payload.to_string(),
            source: ProviderError::Timeout,
        },
        InputType::Text | InputType::Image => {
            IngestError::ExtractionFailed("ingest timed out".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestErrorKind;
    use crate::stores::MemoryCache;
    use crate::testing::{MockFailure, MockFetcher, MockOcr, MockTranscripts};
    use crate::types::config::CacheTtls;

    struct Fixture {
        fetcher: MockFetcher,
        ocr: MockOcr,
        transcripts: MockTranscripts,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                fetcher: MockFetcher::new(),
                ocr: MockOcr::new(),
                transcripts: MockTranscripts::new(),
            }
        }

        fn ingestor(&self) -> Ingestor {
            let cache = CacheLayer::new(Arc::new(MemoryCache::new()), CacheTtls::default());
            let retry = RetryPolicy::new(Duration::from_millis(200), Duration::from_millis(1));
            let pages = PageLoader::new(Arc::new(self.fetcher.clone()), cache.clone(), retry, 10_000);
            Ingestor::new(
                pages,
                Arc::new(self.ocr.clone()),
                Arc::new(self.transcripts.clone()),
                cache,
                retry,
                Duration::from_secs(1),
                10_000,
            )
        }
    }

    #[tokio::test]
    async fn test_text_is_sanitized() {
        let ingestor = Fixture::new().ingestor();
        let request = CheckRequest::text("<script>x()</script><b>The Earth is flat.</b>");

        let content = ingestor.ingest(&request).await.unwrap();
        assert_eq!(content.source_text, "The Earth is flat.");
        assert!(content.source_url.is_none());
    }

    #[tokio::test]
    async fn test_url_ingest_is_served_from_cache_second_time() {
        let mut fixture = Fixture::new();
        fixture.fetcher = MockFetcher::new().with_html(
            "https://news.example.com/story",
            r#"<meta property="article:published_time" content="2024-03-01"><article><p>Rates rose in March 2024.</p></article>"#,
        );
        let ingestor = fixture.ingestor();
        let request = CheckRequest::url("https://news.example.com/story");

        let first = ingestor.ingest(&request).await.unwrap();
        let second = ingestor.ingest(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fixture.fetcher.fetch_count(), 1);
        assert_eq!(first.published_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(first.source_text, "Rates rose in March 2024.");
    }

    #[tokio::test]
    async fn test_fetch_failure_after_retry() {
        let mut fixture = Fixture::new();
        fixture.fetcher =
            MockFetcher::new().fail_url("https://down.example.com/", MockFailure::ServerError);
        let ingestor = fixture.ingestor();

        let err = ingestor
            .ingest(&CheckRequest::url("https://down.example.com/"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), IngestErrorKind::FetchFailed);
        assert_eq!(fixture.fetcher.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_oversized_text_rejected() {
        let ingestor = Fixture::new().ingestor();
        let request = CheckRequest::text("a".repeat(20_000));

        let err = ingestor.ingest(&request).await.unwrap_err();
        assert_eq!(err.kind(), IngestErrorKind::ContentTooLarge);
    }

    #[tokio::test]
    async fn test_image_without_text_fails_extraction() {
        let mut fixture = Fixture::new();
        fixture.ocr = MockOcr::new().with_text("https://img.example.com/chart.png", "GDP grew 3% in 2023.");
        let ingestor = fixture.ingestor();

        let ok = ingestor
            .ingest(&CheckRequest::new(InputType::Image, "https://img.example.com/chart.png", "u1"))
            .await
            .unwrap();
        assert_eq!(ok.source_text, "GDP grew 3% in 2023.");

        let err = ingestor
            .ingest(&CheckRequest::new(InputType::Image, "https://img.example.com/blank.png", "u1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), IngestErrorKind::ExtractionFailed);
    }

    #[tokio::test]
    async fn test_video_without_captions_is_unsupported() {
        let mut fixture = Fixture::new();
        fixture.transcripts = MockTranscripts::new()
            .with_transcript("https://video.example.com/v/1", "The bridge opened in 1937.");
        let ingestor = fixture.ingestor();

        let ok = ingestor
            .ingest(&CheckRequest::new(InputType::Video, "https://video.example.com/v/1", "u1"))
            .await
            .unwrap();
        assert_eq!(ok.source_url.as_deref(), Some("https://video.example.com/v/1"));

        let err = ingestor
            .ingest(&CheckRequest::new(InputType::Video, "https://video.example.com/v/2", "u1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), IngestErrorKind::UnsupportedInput);
    }

    #[tokio::test]
    async fn test_non_web_url_is_unsupported() {
        let ingestor = Fixture::new().ingestor();
        let err = ingestor
            .ingest(&CheckRequest::url("ftp://files.example.com/a.txt"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), IngestErrorKind::UnsupportedInput);
    }
}
