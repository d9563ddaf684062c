//! Typed errors for the verification pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so the orchestrator can
//! switch on error kinds: fatal errors end the run, degraded errors are folded
//! into the affected claim, transient errors are retried at the call site.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::progress::Stage;

/// Errors returned by external collaborators (fetch, OCR, search, models).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call exceeded its timeout
    #[error("provider call timed out")]
    Timeout,

    /// The provider rejected the call due to rate limiting
    #[error("provider rate limited the request")]
    RateLimited,

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-success HTTP status
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The model declined to answer
    #[error("model refused: {0}")]
    Refused(String),

    /// Response body exceeded the configured byte limit
    #[error("response too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: u64 },

    /// The provider is not configured or not reachable
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something we could not interpret
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The target was blocked by URL validation or robots.txt
    #[error("blocked: {0}")]
    Blocked(String),
}

impl ProviderError {
    /// Whether this error is worth one bounded retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited | Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Wrap any error as an HTTP transport error.
    pub fn http(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Http(Box::new(error))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            Self::Http(Box::new(error))
        }
    }
}

impl From<SecurityError> for ProviderError {
    fn from(error: SecurityError) -> Self {
        Self::Blocked(error.to_string())
    }
}

/// Cache backend failure. Never escapes the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result sink failure.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),

    #[error("result could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the ingest stage. All are fatal to the run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("fetch failed for {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: ProviderError,
    },

    #[error("content too large: {size} bytes exceeds limit of {limit}")]
    ContentTooLarge { size: u64, limit: u64 },

    #[error("no text could be extracted: {0}")]
    ExtractionFailed(String),
}

/// Discriminant of [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestErrorKind {
    UnsupportedInput,
    FetchFailed,
    ContentTooLarge,
    ExtractionFailed,
}

impl IngestError {
    pub fn kind(&self) -> IngestErrorKind {
        match self {
            Self::UnsupportedInput(_) => IngestErrorKind::UnsupportedInput,
            Self::FetchFailed { .. } => IngestErrorKind::FetchFailed,
            Self::ContentTooLarge { .. } => IngestErrorKind::ContentTooLarge,
            Self::ExtractionFailed(_) => IngestErrorKind::ExtractionFailed,
        }
    }
}

/// Errors from the claim extractor. Fatal once the retry budget is spent.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("claim extraction model timed out")]
    ModelTimeout,

    #[error("claim extraction model refused: {0}")]
    ModelRefused(String),

    #[error("claim extraction output was malformed: {0}")]
    MalformedOutput(String),

    #[error("claim extraction model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Discriminant of [`ExtractionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    ModelTimeout,
    ModelRefused,
    MalformedOutput,
    ModelUnavailable,
}

impl From<ProviderError> for ExtractionError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout => Self::ModelTimeout,
            ProviderError::Refused(reason) => Self::ModelRefused(reason),
            ProviderError::InvalidResponse(detail) => Self::MalformedOutput(detail),
            other => Self::ModelUnavailable(other.to_string()),
        }
    }
}

impl ExtractionError {
    pub fn kind(&self) -> ExtractionErrorKind {
        match self {
            Self::ModelTimeout => ExtractionErrorKind::ModelTimeout,
            Self::ModelRefused(_) => ExtractionErrorKind::ModelRefused,
            Self::MalformedOutput(_) => ExtractionErrorKind::MalformedOutput,
            Self::ModelUnavailable(_) => ExtractionErrorKind::ModelUnavailable,
        }
    }
}

/// Errors from evidence retrieval. Degrade the claim, never the run.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("search provider unavailable: {0}")]
    SearchProviderUnavailable(#[source] ProviderError),

    #[error("no evidence found")]
    NoResultsFound,
}

/// Errors from the NLI verifier. Degrade the claim's snippets to neutral.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("NLI model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Errors from the judge. Trigger the deterministic fallback verdict.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge model timed out")]
    ModelTimeout,

    #[error("judge output was malformed: {0}")]
    MalformedOutput(String),

    #[error("judge model unavailable: {0}")]
    ModelUnavailable(String),
}

impl From<ProviderError> for JudgeError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Timeout => Self::ModelTimeout,
            ProviderError::InvalidResponse(detail) => Self::MalformedOutput(detail),
            other => Self::ModelUnavailable(other.to_string()),
        }
    }
}

/// Error kinds that can end a run as `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "kind")]
pub enum FailureKind {
    Ingest(IngestErrorKind),
    Extraction(ExtractionErrorKind),
    RunTimeout,
}

/// Structured failure payload attached to a failed `CheckResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{stage:?} failed: {message}")]
pub struct PipelineError {
    /// Stage the run was in when it failed
    pub stage: Stage,

    /// Which error ended the run
    pub kind: FailureKind,

    /// Human-readable description
    pub message: String,
}

impl PipelineError {
    pub fn run_timeout(stage: Stage) -> Self {
        Self {
            stage,
            kind: FailureKind::RunTimeout,
            message: "run exceeded its overall time budget".to_string(),
        }
    }
}

impl From<IngestError> for PipelineError {
    fn from(error: IngestError) -> Self {
        Self {
            stage: Stage::Ingesting,
            kind: FailureKind::Ingest(error.kind()),
            message: error.to_string(),
        }
    }
}

impl From<ExtractionError> for PipelineError {
    fn from(error: ExtractionError) -> Self {
        Self {
            stage: Stage::Extracting,
            kind: FailureKind::Extraction(error.kind()),
            message: error.to_string(),
        }
    }
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias for collaborator calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Result type alias for security checks.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ProviderError::Status {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!ProviderError::Refused("policy".into()).is_transient());
    }

    #[test]
    fn test_pipeline_error_from_ingest() {
        let err: PipelineError = IngestError::UnsupportedInput("no captions".into()).into();
        assert_eq!(err.stage, Stage::Ingesting);
        assert_eq!(
            err.kind,
            FailureKind::Ingest(IngestErrorKind::UnsupportedInput)
        );
    }

    #[test]
    fn test_failure_kind_serializes_with_stage_tag() {
        let kind = FailureKind::Extraction(ExtractionErrorKind::MalformedOutput);
        let json = serde_json::to_value(kind).unwrap();
        assert_eq!(json["stage"], "extraction");
        assert_eq!(json["kind"], "malformed_output");
    }
}
