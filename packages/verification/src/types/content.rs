//! Normalized content produced by the ingest stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Plain text plus metadata, the uniform input to claim extraction.
///
/// Owned by a single pipeline run and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedContent {
    /// Sanitized plain text
    pub source_text: String,

    /// Original URL when the input was a URL
    pub source_url: Option<String>,

    /// Best-effort publish date of the original content
    pub published_date: Option<NaiveDate>,

    /// Content-addressable key used for caching and idempotency
    pub content_hash: String,
}

impl NormalizedContent {
    pub fn new(source_text: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            source_url: None,
            published_date: None,
            content_hash: content_hash.into(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_published_date(mut self, date: Option<NaiveDate>) -> Self {
        self.published_date = date;
        self
    }
}

/// Calculate the SHA-256 hex digest of `kind` and `discriminator`.
///
/// The kind prefix keeps identical payloads of different input types apart.
pub fn hash_content(kind: &str, discriminator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(discriminator.as_bytes());
    format!("{:x}", hasher.finalize())
}
