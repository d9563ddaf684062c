//! Configuration types for the verification pipeline.
//!
//! Every tunable lives here so it can be loaded from a config file by the
//! embedding application. Durations are stored as milliseconds/seconds to
//! keep the serialized form flat.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::request::Mode;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Settings for quick mode (latency first).
    pub quick: ModeConfig,

    /// Settings for deep mode (more evidence, longer budget).
    pub deep: ModeConfig,

    /// Maximum claims kept from the extractor. Extra claims are truncated
    /// in extraction order. Default: 20.
    pub max_claims: usize,

    /// Maximum characters of source text sent to the extractor.
    pub max_input_chars: usize,

    /// Maximum bytes accepted from a fetch or a raw text submission.
    pub max_input_bytes: u64,

    /// Maximum characters kept per evidence snippet.
    pub max_snippet_chars: usize,

    /// Claims processed concurrently within one run. Default: 4.
    pub claim_concurrency: usize,

    /// Only sources published within this many years get the recency
    /// bonus, and date-bounded queries look back this far. Default: 2.
    pub recency_years: u32,

    pub timeouts: StageTimeouts,
    pub retry: RetryConfig,
    pub verdict: VerdictPolicy,
    pub early_stop: EarlyStopConfig,
    pub cache_ttls: CacheTtls,
    pub credibility: CredibilityConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quick: ModeConfig::quick(),
            deep: ModeConfig::deep(),
            max_claims: 20,
            max_input_chars: 12_000,
            max_input_bytes: 2 * 1024 * 1024,
            max_snippet_chars: 600,
            claim_concurrency: 4,
            recency_years: 2,
            timeouts: StageTimeouts::default(),
            retry: RetryConfig::default(),
            verdict: VerdictPolicy::default(),
            early_stop: EarlyStopConfig::default(),
            cache_ttls: CacheTtls::default(),
            credibility: CredibilityConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for the given mode.
    pub fn mode(&self, mode: Mode) -> &ModeConfig {
        match mode {
            Mode::Quick => &self.quick,
            Mode::Deep => &self.deep,
        }
    }

    pub fn with_max_claims(mut self, max: usize) -> Self {
        self.max_claims = max;
        self
    }

    pub fn with_claim_concurrency(mut self, concurrency: usize) -> Self {
        self.claim_concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_verdict_policy(mut self, policy: VerdictPolicy) -> Self {
        self.verdict = policy;
        self
    }

    pub fn with_credibility(mut self, credibility: CredibilityConfig) -> Self {
        self.credibility = credibility;
        self
    }

    /// Override the run timeout for both modes.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        let ms = timeout.as_millis() as u64;
        self.quick.run_timeout_ms = ms;
        self.deep.run_timeout_ms = ms;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry.backoff_ms = backoff.as_millis() as u64;
        self
    }
}

/// Per-mode evidence and latency budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Results requested per search query.
    pub search_results: usize,

    /// Maximum search queries issued per claim.
    pub query_budget: usize,

    /// Evidence snippets kept per claim (top-N by rank).
    pub evidence_cap: usize,

    /// Fetch each candidate page to select a passage, instead of relying
    /// on the search provider's snippet.
    pub fetch_full_pages: bool,

    /// Overall run budget.
    pub run_timeout_ms: u64,
}

impl ModeConfig {
    pub fn quick() -> Self {
        Self {
            search_results: 10,
            query_budget: 2,
            evidence_cap: 10,
            fetch_full_pages: false,
            run_timeout_ms: 10_000,
        }
    }

    pub fn deep() -> Self {
        Self {
            search_results: 20,
            query_budget: 3,
            evidence_cap: 15,
            fetch_full_pages: true,
            run_timeout_ms: 30_000,
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }
}

/// Independent timeout per stage. Per-claim stages are timed per claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub ingest_ms: u64,
    pub extract_ms: u64,
    pub retrieve_ms: u64,
    pub verify_ms: u64,
    pub judge_ms: u64,

    /// Hard timeout of a single outbound call attempt.
    pub call_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            ingest_ms: 4_000,
            extract_ms: 4_000,
            retrieve_ms: 5_000,
            verify_ms: 2_000,
            judge_ms: 3_000,
            call_ms: 3_000,
        }
    }
}

impl StageTimeouts {
    pub fn ingest(&self) -> Duration {
        Duration::from_millis(self.ingest_ms)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_millis(self.extract_ms)
    }

    pub fn retrieve(&self) -> Duration {
        Duration::from_millis(self.retrieve_ms)
    }

    pub fn verify(&self) -> Duration {
        Duration::from_millis(self.verify_ms)
    }

    pub fn judge(&self) -> Duration {
        Duration::from_millis(self.judge_ms)
    }

    pub fn call(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }
}

/// Bounded retry for transient errors. Exactly one retry is attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the single retry.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { backoff_ms: 250 }
    }
}

/// Thresholds turning the aggregate NLI signal into a verdict.
///
/// Asymmetric on purpose: a false "contradicted" costs more than a false
/// "uncertain", so contradiction needs less net weight but is only chosen
/// when supported is not.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictPolicy {
    /// Net entailment share of total weight required for `supported`.
    pub supported_threshold: f32,

    /// Net contradiction share of total weight required for `contradicted`.
    pub contradicted_threshold: f32,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            supported_threshold: 0.6,
            contradicted_threshold: 0.4,
        }
    }
}

/// Stop issuing search queries once enough strong sources are found.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStopConfig {
    pub min_sources: usize,
    pub min_relevance: f32,
    pub min_credibility: f32,
}

impl Default for EarlyStopConfig {
    fn default() -> Self {
        Self {
            min_sources: 3,
            min_relevance: 0.75,
            min_credibility: 0.8,
        }
    }
}

/// Time-to-live per cache tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    /// Exact-URL fetches and ingest results.
    pub page_fetch_secs: u64,

    /// Domain-restricted keyword searches.
    pub domain_search_secs: u64,

    /// Raw search queries.
    pub query_search_secs: u64,

    /// Embeddings. `None` keeps them indefinitely.
    pub embedding_secs: Option<u64>,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            page_fetch_secs: 3 * 24 * 60 * 60,
            domain_search_secs: 6 * 60 * 60,
            query_search_secs: 30 * 60,
            embedding_secs: None,
        }
    }
}

/// Source-trust priors keyed by domain.
///
/// The concrete domain table is data owned by deployment configuration.
/// Only the suffix tiers ship as defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredibilityConfig {
    /// Score for domains matching no rule.
    pub default_score: f32,

    /// Exact domain scores (subdomains inherit).
    pub domains: HashMap<String, f32>,

    /// Scores by domain suffix, first match wins.
    pub suffix_tiers: Vec<(String, f32)>,
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            default_score: 0.6,
            domains: HashMap::new(),
            suffix_tiers: vec![
                (".gov".to_string(), 1.0),
                (".edu".to_string(), 1.0),
                (".mil".to_string(), 1.0),
            ],
        }
    }
}

impl CredibilityConfig {
    /// Add an exact domain score.
    pub fn with_domain(mut self, domain: impl Into<String>, score: f32) -> Self {
        self.domains.insert(domain.into().to_lowercase(), score);
        self
    }

    /// Add several domains at the same score.
    pub fn with_tier(mut self, domains: &[&str], score: f32) -> Self {
        for domain in domains {
            self.domains.insert(domain.to_lowercase(), score);
        }
        self
    }
}
