//! Single bounded retry for transient collaborator errors.
//!
//! Retries happen only here, at the point of failure. Stages and the
//! orchestrator never retry a call that already went through this path.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{ProviderError, ProviderResult};
use crate::types::config::PipelineConfig;

/// Per-attempt timeout and the delay before the one retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(call_timeout: Duration, backoff: Duration) -> Self {
        Self {
            call_timeout,
            backoff,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.timeouts.call(),
            Duration::from_millis(config.retry.backoff_ms),
        )
    }

    /// Run `call`, retrying once if the first attempt fails transiently.
    ///
    /// Each attempt is bounded by `call_timeout`; an elapsed attempt counts
    /// as a transient `ProviderError::Timeout`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        match self.attempt(&mut call).await {
            Err(e) if e.is_transient() => {
                warn!(
                    operation = operation,
                    error = %e,
                    backoff_ms = self.backoff.as_millis() as u64,
                    "Transient failure, retrying once"
                );
                tokio::time::sleep(self.backoff).await;
                self.attempt(&mut call).await
            }
            other => other,
        }
    }

    async fn attempt<T, F, Fut>(&self, call: &mut F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(50), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let calls = AtomicUsize::new(0);
        let result = policy()
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::RateLimited)
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: ProviderResult<()> = policy()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Refused("no".into()))
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Refused(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_at_most_two_attempts() {
        let calls = AtomicUsize::new(0);
        let result: ProviderResult<()> = policy()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Timeout)
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hung_attempt_times_out() {
        let result: ProviderResult<()> = policy()
            .run("hang", || std::future::pending::<ProviderResult<()>>())
            .await;
        assert!(matches!(result, Err(ProviderError::Timeout)));
    }
}
