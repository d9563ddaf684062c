//! Fail-open typed access to the evidence cache.

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::traits::cache::{CacheKey, CacheKind, EvidenceCache};
use crate::types::config::CacheTtls;

/// Typed, tiered wrapper around an [`EvidenceCache`] backend.
///
/// Cache unavailability never fails the pipeline: every backend or
/// (de)serialization error is logged and treated as a miss.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn EvidenceCache>,
    ttls: CacheTtls,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn EvidenceCache>, ttls: CacheTtls) -> Self {
        Self { backend, ttls }
    }

    /// TTL tier for a kind of entry. `None` means keep indefinitely.
    pub fn ttl_for(&self, kind: CacheKind) -> Option<Duration> {
        match kind {
            CacheKind::Ingest | CacheKind::PageFetch => {
                Some(Duration::from_secs(self.ttls.page_fetch_secs))
            }
            CacheKind::DomainSearch => Some(Duration::from_secs(self.ttls.domain_search_secs)),
            CacheKind::QuerySearch => Some(Duration::from_secs(self.ttls.query_search_secs)),
            CacheKind::Embedding => self.ttls.embedding_secs.map(Duration::from_secs),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind, discriminator: &str) -> Option<T> {
        let key = CacheKey::compute(kind, discriminator);
        match self.backend.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(decoded) => {
                    debug!(kind = kind.as_str(), key = %key, "Cache hit");
                    Some(decoded)
                }
                Err(e) => {
                    warn!(kind = kind.as_str(), key = %key, error = %e, "Undecodable cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => {
                debug!(kind = kind.as_str(), key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(kind = kind.as_str(), key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, kind: CacheKind, discriminator: &str, value: &T) {
        let key = CacheKey::compute(kind, discriminator);
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(kind = kind.as_str(), key = %key, error = %e, "Cache value not serializable");
                return;
            }
        };

        if let Err(e) = self.backend.put(&key, value, self.ttl_for(kind)).await {
            warn!(kind = kind.as_str(), key = %key, error = %e, "Cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryCache;
    use crate::testing::FailingCache;

    #[tokio::test]
    async fn test_round_trip_through_backend() {
        let layer = CacheLayer::new(Arc::new(MemoryCache::new()), CacheTtls::default());
        layer
            .put(CacheKind::Embedding, "hello", &vec![0.5f32, 0.5])
            .await;
        let hit: Option<Vec<f32>> = layer.get(CacheKind::Embedding, "hello").await;
        assert_eq!(hit, Some(vec![0.5, 0.5]));
    }

    #[tokio::test]
    async fn test_backend_errors_degrade_to_miss() {
        let layer = CacheLayer::new(Arc::new(FailingCache), CacheTtls::default());
        layer.put(CacheKind::PageFetch, "https://example.com", &"body").await;
        let hit: Option<String> = layer.get(CacheKind::PageFetch, "https://example.com").await;
        assert!(hit.is_none());
    }

    #[test]
    fn test_ttl_tiers() {
        let layer = CacheLayer::new(Arc::new(MemoryCache::new()), CacheTtls::default());
        let page = layer.ttl_for(CacheKind::PageFetch).unwrap();
        let domain = layer.ttl_for(CacheKind::DomainSearch).unwrap();
        let query = layer.ttl_for(CacheKind::QuerySearch).unwrap();
        assert!(page > domain && domain > query);
        assert!(query < Duration::from_secs(3600));
        assert!(layer.ttl_for(CacheKind::Embedding).is_none());
    }
}
