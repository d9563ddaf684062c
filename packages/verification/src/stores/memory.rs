//! In-memory storage for the evidence cache and check results.
//!
//! Useful for a single process and for tests. Not suitable when several
//! processes must share cache entries, as data is lost on restart.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CacheError, SinkError};
use crate::traits::cache::{CacheKey, EvidenceCache};
use crate::traits::sink::ResultSink;
use crate::types::result::CheckResult;

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

const DEFAULT_SWEEP_INTERVAL: usize = 256;

/// Concurrent in-memory evidence cache with per-entry TTL.
///
/// Sharded through `DashMap`, so concurrent runs never block each other on
/// a global lock. Concurrent writes to one key resolve as last write wins.
/// Expired entries are swept every `sweep_interval` writes.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    writes: AtomicUsize,
    sweep_interval: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicUsize::new(0),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired entries every `writes` puts.
    pub fn with_sweep_interval(mut self, writes: usize) -> Self {
        self.sweep_interval = writes.max(1);
        self
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl EvidenceCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError> {
        let now = Instant::now();
        let hit = match self.entries.get(key.as_str()) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if hit.is_none() {
            self.entries
                .remove_if(key.as_str(), |_, entry| entry.is_expired(now));
        }
        Ok(hit)
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.as_str().to_string(), CacheEntry { value, expires_at });

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.sweep_interval == 0 {
            let removed = self.purge_expired();
            debug!(removed = removed, remaining = self.entries.len(), "Swept expired cache entries");
        }
        Ok(())
    }
}

/// In-memory result store. Upserts replace the previous result for a check.
#[derive(Default)]
pub struct MemoryResultSink {
    results: DashMap<Uuid, CheckResult>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, check_id: &Uuid) -> Option<CheckResult> {
        self.results.get(check_id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    async fn upsert(&self, result: &CheckResult) -> Result<(), SinkError> {
        self.results.insert(result.check_id, result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::cache::CacheKind;
    use crate::types::result::{CheckStatus, CreditSettlement};
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = MemoryCache::new();
        let key = CacheKey::compute(CacheKind::Embedding, "hello");

        assert!(cache.get(&key).await.unwrap().is_none());
        cache.put(&key, json!([0.1, 0.2]), None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(json!([0.1, 0.2])));
    }

    #[tokio::test]
    async fn test_expired_entries_miss() {
        let cache = MemoryCache::new();
        let key = CacheKey::compute(CacheKind::QuerySearch, "q");

        cache
            .put(&key, json!("stale"), Some(Duration::from_millis(0)))
            .await
            .unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_swept_on_write() {
        let cache = MemoryCache::new().with_sweep_interval(4);
        for i in 0..3 {
            let key = CacheKey::compute(CacheKind::QuerySearch, &format!("old-{}", i));
            cache
                .put(&key, json!(i), Some(Duration::from_millis(0)))
                .await
                .unwrap();
        }
        // Never read back, so only the sweep can remove them.
        assert_eq!(cache.len(), 3);

        let fresh = CacheKey::compute(CacheKind::Embedding, "fresh");
        cache.put(&fresh, json!("kept"), None).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fresh).await.unwrap(), Some(json!("kept")));
    }

    #[test]
    fn test_purge_keeps_live_entries() {
        let cache = MemoryCache::new();
        cache.entries.insert(
            "live".to_string(),
            CacheEntry {
                value: json!(1),
                expires_at: None,
            },
        );
        cache.entries.insert(
            "dead".to_string(),
            CacheEntry {
                value: json!(2),
                expires_at: Some(Instant::now()),
            },
        );
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryCache::new();
        let key = CacheKey::compute(CacheKind::PageFetch, "https://example.com");

        cache.put(&key, json!("first"), None).await.unwrap();
        cache.put(&key, json!("second"), None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(json!("second")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_corrupt() {
        let cache = std::sync::Arc::new(MemoryCache::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = CacheKey::compute(CacheKind::Embedding, &format!("text-{}", i % 4));
                cache.put(&key, json!(i), None).await.unwrap();
                cache.get(&key).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn test_sink_upsert_is_idempotent() {
        let sink = MemoryResultSink::new();
        let result = CheckResult {
            check_id: Uuid::now_v7(),
            status: CheckStatus::Completed,
            claims: vec![],
            error: None,
            credits: CreditSettlement::for_status(CheckStatus::Completed, 1),
            timings: vec![],
            finished_at: chrono::Utc::now(),
        };

        sink.upsert(&result).await.unwrap();
        sink.upsert(&result).await.unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get(&result.check_id), Some(result));
    }
}
