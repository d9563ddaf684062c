//! Result sink trait standing in for the persistence layer.

use async_trait::async_trait;

use crate::error::SinkError;
use crate::types::result::CheckResult;

/// Receives finished check results.
///
/// `upsert` must be idempotent: writing the same check twice leaves one
/// record holding the latest result.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn upsert(&self, result: &CheckResult) -> Result<(), SinkError>;
}
