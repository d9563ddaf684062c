//! Rate-limited searcher wrapper.
//!
//! Search providers bill and throttle per request, and one run can fan out
//! many claims at once. Wrapping the searcher keeps every concurrent claim
//! under one shared quota.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::ProviderResult;
use crate::traits::searcher::{SearchQuery, SearchResult, WebSearcher};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A [`WebSearcher`] that waits for a permit before each query.
pub struct RateLimitedSearcher<S: WebSearcher> {
    inner: S,
    limiter: Arc<DirectRateLimiter>,
}

impl<S: WebSearcher> RateLimitedSearcher<S> {
    /// Allow `requests_per_second` sustained queries (minimum 1).
    pub fn new(searcher: S, requests_per_second: u32) -> Self {
        Self::with_quota(searcher, Quota::per_second(non_zero(requests_per_second)))
    }

    /// Sustained rate plus a burst allowance.
    pub fn with_burst(searcher: S, requests_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(non_zero(requests_per_second)).allow_burst(non_zero(burst));
        Self::with_quota(searcher, quota)
    }

    pub fn with_quota(searcher: S, quota: Quota) -> Self {
        Self {
            inner: searcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

#[async_trait]
impl<S: WebSearcher> WebSearcher for RateLimitedSearcher<S> {
    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<SearchResult>> {
        self.limiter.until_ready().await;
        self.inner.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSearcher;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_delegates_to_inner_searcher() {
        let inner = MockSearcher::new().with_results(
            "vaccines cause autism",
            vec![SearchResult::from_url("https://cdc.gov/vaccines").unwrap()],
        );
        let searcher = RateLimitedSearcher::new(inner, 10);

        let results = searcher
            .search(&SearchQuery::new("vaccines cause autism", 5))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_throttles_beyond_burst() {
        let searcher = RateLimitedSearcher::with_burst(MockSearcher::new(), 20, 1);
        let query = SearchQuery::new("q", 1);

        let start = Instant::now();
        for _ in 0..3 {
            searcher.search(&query).await.unwrap();
        }
        // Two waits of ~50ms each after the single burst permit.
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
