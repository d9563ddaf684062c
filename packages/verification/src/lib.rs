//! Claim Verification Pipeline
//!
//! Takes a piece of content (URL, text, image or video), pulls out the
//! checkable factual claims, finds evidence for each one on the open web,
//! and settles every claim as supported, contradicted or uncertain with a
//! confidence and a rationale.
//!
//! # Stages
//!
//! ```text
//! CheckRequest → Ingest → Extract → ┬ Retrieve → Verify → Judge ┬ → CheckResult
//!                                   ├ Retrieve → Verify → Judge ┤
//!                                   └ ...  (bounded fan-out)    ┘
//! ```
//!
//! Ingest and extraction failures end the run as `failed`. Everything after
//! the fan-out degrades a single claim instead: no evidence or an
//! unreachable NLI model still yields an `uncertain` verdict, and the judge
//! falls back to a rule over the weighted NLI aggregate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use verification::{CheckRequest, Pipeline, PipelineConfig, Services};
//!
//! let pipeline = Pipeline::new(services, PipelineConfig::default());
//! let mut handle = pipeline.spawn(CheckRequest::text("The Earth is flat."));
//!
//! let mut events = handle.events();
//! while let Some(event) = events.next().await {
//!     println!("{}% {}", event.progress_percent, event.message);
//! }
//! let result = handle.result().await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Capability interfaces for every external collaborator
//! - [`types`] - Requests, claims, evidence, progress, results, config
//! - [`pipeline`] - Stages and the orchestrator
//! - [`providers`] - HTTP-backed collaborators (OpenAI, Tavily, NLI, OCR)
//! - [`stores`] - In-memory cache and result sink
//! - [`security`] - Credential handling and SSRF protection
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod providers;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    CacheError, ExtractionError, ExtractionErrorKind, FailureKind, IngestError, IngestErrorKind,
    JudgeError, PipelineError, ProviderError, ProviderResult, RetrievalError, SecurityError,
    SinkError, VerificationError,
};
pub use traits::{
    cache::{CacheKey, CacheKind, EvidenceCache},
    classifier::{NliClassifier, NliPair, NliScores},
    completion::{CompletionModel, CompletionRequest},
    embedder::{cosine_similarity, Embedder},
    fetcher::{ContentFetcher, FetchedPage},
    media::{OcrService, TranscriptService},
    searcher::{SearchQuery, SearchResult, WebSearcher},
    sink::ResultSink,
};
pub use types::{
    claim::{Claim, Verdict, VerifiedClaim},
    config::{
        CacheTtls, CredibilityConfig, EarlyStopConfig, ModeConfig, PipelineConfig, RetryConfig,
        StageTimeouts, VerdictPolicy,
    },
    content::NormalizedContent,
    evidence::{EvidenceSnippet, NliLabel},
    progress::{ProgressEvent, Stage},
    request::{CheckRequest, InputType, Mode},
    result::{CheckResult, CheckStatus, CreditSettlement, StageTiming},
};

// Re-export the orchestrator
pub use pipeline::{CheckHandle, Pipeline, RunSnapshot, Services};

// Re-export providers
pub use providers::{
    HttpFetcher, HttpNliClassifier, HttpOcrService, HttpTranscriptService, OpenAi,
    RateLimitedSearcher, TavilySearcher,
};

// Re-export stores
pub use stores::{MemoryCache, MemoryResultSink};

pub use security::{SecretString, ServiceCredentials, UrlPolicy};
