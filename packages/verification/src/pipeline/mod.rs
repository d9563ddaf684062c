//! Verification pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Ingest (URL, text, image, video → sanitized plain text)
//! - Claim extraction (structured-output model call)
//! - Evidence retrieval (search → passage → embedding relevance → ranking)
//! - NLI verification (one batched classifier call per claim)
//! - Judging (model verdict with a rule-based fallback)
//!
//! plus the fail-open cache layer, the single-retry policy and progress
//! reporting shared by every stage.

pub mod cache;
pub mod credibility;
pub mod extract;
pub mod ingest;
pub mod judge;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod retrieve;
pub mod retry;
pub mod run;
pub mod sanitize;
pub mod verify;

pub use cache::CacheLayer;
pub use credibility::CredibilityTable;
pub use extract::{budget_input, normalize_claims, ClaimExtractor};
pub use ingest::{Ingestor, LoadedPage, PageLoader};
pub use judge::{Judge, Judgement, JudgementSource};
pub use orchestrator::{CheckHandle, Pipeline, Services, TIMED_OUT_RATIONALE};
pub use progress::{event_stream, ProgressReporter};
pub use prompts::{ExtractedClaims, JudgeOutput, EXTRACT_SCHEMA_NAME, JUDGE_SCHEMA_NAME};
pub use retrieve::{rank, recency_score, select_passage, term_overlap, EvidenceRetriever};
pub use retry::RetryPolicy;
pub use run::{PipelineRun, RunSnapshot};
pub use verify::{NliAggregate, Verification, Verifier};
