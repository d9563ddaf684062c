//! Evidence cache trait and content-addressed keys.
//!
//! The cache is the only state shared across concurrent runs. Values are
//! idempotent recomputations of their key, so write races are resolved as
//! last write wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CacheError;
use crate::types::content::hash_content;

/// What a cache entry holds. Determines the key namespace and the TTL tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Normalized ingest output, keyed by content hash
    Ingest,
    /// Exact-URL fetch result
    PageFetch,
    /// Domain-restricted keyword search
    DomainSearch,
    /// Raw search query
    QuerySearch,
    /// Embedding vector, keyed by the embedded text
    Embedding,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::PageFetch => "page_fetch",
            Self::DomainSearch => "domain_search",
            Self::QuerySearch => "query_search",
            Self::Embedding => "embedding",
        }
    }
}

/// A content-addressed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for `discriminator` within `kind`.
    ///
    /// The same inputs always produce the same key.
    pub fn compute(kind: CacheKind, discriminator: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), hash_content(kind.as_str(), discriminator)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend for the evidence cache.
///
/// Implementations must be safe for concurrent reads and writes. Callers go
/// through [`crate::pipeline::cache::CacheLayer`], which turns every error
/// into a miss.
#[async_trait]
pub trait EvidenceCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError>;

    /// Store a value. `ttl = None` keeps it indefinitely.
    async fn put(
        &self,
        key: &CacheKey,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_key_is_deterministic() {
        let a = CacheKey::compute(CacheKind::PageFetch, "https://example.com");
        let b = CacheKey::compute(CacheKind::PageFetch, "https://example.com");
        let c = CacheKey::compute(CacheKind::QuerySearch, "https://example.com");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("page_fetch:"));
    }
}
