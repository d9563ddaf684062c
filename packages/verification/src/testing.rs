//! Testing utilities including mock implementations.
//!
//! Every collaborator trait has a deterministic double here so pipelines
//! can be exercised without network or model calls. Mocks are cheap to
//! clone: clones share canned responses and call history, so a test can
//! hand one clone to the pipeline and assert on another.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{CacheError, ProviderError, ProviderResult};
use crate::pipeline::prompts::{EXTRACT_SCHEMA_NAME, JUDGE_SCHEMA_NAME};
use crate::traits::{
    cache::{CacheKey, EvidenceCache},
    classifier::{NliClassifier, NliPair, NliScores},
    completion::{CompletionModel, CompletionRequest},
    embedder::Embedder,
    fetcher::{ContentFetcher, FetchedPage},
    media::{OcrService, TranscriptService},
    searcher::{SearchQuery, SearchResult, WebSearcher},
};
use crate::types::{claim::Verdict, evidence::NliLabel};

/// Canned failure, materialized as a fresh [`ProviderError`] per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    RateLimited,
    Refused,
    Unavailable,
    ServerError,
}

impl MockFailure {
    fn to_error(self) -> ProviderError {
        match self {
            Self::Timeout => ProviderError::Timeout,
            Self::RateLimited => ProviderError::RateLimited,
            Self::Refused => ProviderError::Refused("mock refusal".into()),
            Self::Unavailable => ProviderError::Unavailable("mock provider down".into()),
            Self::ServerError => ProviderError::Status {
                status: 503,
                body: "mock".into(),
            },
        }
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Mock content fetcher serving canned pages by URL.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, FetchedPage>>>,
    failures: Arc<RwLock<HashMap<String, MockFailure>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: FetchedPage) -> Self {
        self.pages.write().unwrap().insert(page.url.clone(), page);
        self
    }

    /// Serve an HTML body for a URL.
    pub fn with_html(self, url: &str, html: &str) -> Self {
        self.with_page(FetchedPage::new(url, html).with_content_type("text/html"))
    }

    pub fn fail_url(self, url: impl Into<String>, failure: MockFailure) -> Self {
        self.failures.write().unwrap().insert(url.into(), failure);
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> ProviderResult<FetchedPage> {
        self.calls.write().unwrap().push(url.to_string());

        if let Some(failure) = self.failures.read().unwrap().get(url) {
            return Err(failure.to_error());
        }

        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                body: format!("mock has no page for {}", url),
            })
    }
}

// ============================================================================
// OCR and transcripts
// ============================================================================

/// Mock OCR returning canned text per image reference (empty by default).
#[derive(Clone, Default)]
pub struct MockOcr {
    texts: Arc<RwLock<HashMap<String, String>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, reference: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.write().unwrap().insert(reference.into(), text.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl OcrService for MockOcr {
    async fn extract_text(&self, reference: &str) -> ProviderResult<String> {
        self.calls.write().unwrap().push(reference.to_string());
        Ok(self
            .texts
            .read()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or_default())
    }
}

/// Mock transcript service. Videos without a canned transcript have none.
#[derive(Clone, Default)]
pub struct MockTranscripts {
    transcripts: Arc<RwLock<HashMap<String, String>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockTranscripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(self, video_url: impl Into<String>, text: impl Into<String>) -> Self {
        self.transcripts
            .write()
            .unwrap()
            .insert(video_url.into(), text.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptService for MockTranscripts {
    async fn fetch_transcript(&self, video_url: &str) -> ProviderResult<Option<String>> {
        self.calls.write().unwrap().push(video_url.to_string());
        Ok(self.transcripts.read().unwrap().get(video_url).cloned())
    }
}

// ============================================================================
// Search
// ============================================================================

#[derive(Clone, Copy, Default)]
enum SearchBehavior {
    #[default]
    Answer,
    Fail,
    Hang,
}

/// Mock web searcher keyed by normalized query text.
#[derive(Clone, Default)]
pub struct MockSearcher {
    results: Arc<RwLock<HashMap<String, Vec<SearchResult>>>>,
    default_results: Arc<RwLock<Vec<SearchResult>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    latency: Option<Duration>,
    behavior: SearchBehavior,
    calls: Arc<RwLock<Vec<SearchQuery>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight count when a search finishes or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn query_key(text: &str) -> String {
    text.trim().to_lowercase()
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results
            .write()
            .unwrap()
            .insert(query_key(query), results);
        self
    }

    /// Add URL/snippet pairs as results for a query.
    pub fn with_snippets(self, query: &str, hits: &[(&str, &str)]) -> Self {
        let results = hits
            .iter()
            .filter_map(|(url, snippet)| SearchResult::from_url(url).map(|r| r.with_snippet(*snippet)))
            .collect();
        self.with_results(query, results)
    }

    /// Results for any query without its own entry.
    pub fn with_default_results(self, results: Vec<SearchResult>) -> Self {
        *self.default_results.write().unwrap() = results;
        self
    }

    /// Delay answers for one query, to reorder concurrent completions.
    pub fn with_delay(self, query: &str, delay: Duration) -> Self {
        self.delays.write().unwrap().insert(query_key(query), delay);
        self
    }

    /// Delay every answer, so concurrent searches overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every search fails as unavailable.
    pub fn failing(mut self) -> Self {
        self.behavior = SearchBehavior::Fail;
        self
    }

    /// Every search never returns.
    pub fn hanging(mut self) -> Self {
        self.behavior = SearchBehavior::Hang;
        self
    }

    pub fn calls(&self) -> Vec<SearchQuery> {
        self.calls.read().unwrap().clone()
    }

    /// Highest number of searches that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<SearchResult>> {
        self.calls.write().unwrap().push(query.clone());
        let key = query_key(&query.text);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        match self.behavior {
            SearchBehavior::Fail => return Err(ProviderError::Unavailable("mock search down".into())),
            SearchBehavior::Hang => std::future::pending::<()>().await,
            SearchBehavior::Answer => {}
        }

        let delay = self.delays.read().unwrap().get(&key).copied().or(self.latency);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let results = self
            .results
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default_results.read().unwrap().clone());
        Ok(results.into_iter().take(query.limit).collect())
    }
}

// ============================================================================
// Embeddings
// ============================================================================

/// Mock embedder with canned vectors and a deterministic hash fallback.
#[derive(Clone)]
pub struct MockEmbedder {
    embeddings: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    default_embedding: Arc<RwLock<Option<Vec<f32>>>>,
    dim: usize,
    failing: bool,
    calls: Arc<RwLock<Vec<String>>>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            embeddings: Arc::default(),
            default_embedding: Arc::default(),
            dim: 16,
            failing: false,
            calls: Arc::default(),
        }
    }
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.embeddings
            .write()
            .unwrap()
            .insert(text.into(), embedding);
        self
    }

    /// Vector for every text without its own entry.
    pub fn with_default_embedding(self, embedding: Vec<f32>) -> Self {
        *self.default_embedding.write().unwrap() = Some(embedding);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Texts embedded so far (cache hits never reach the mock).
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let hash = Sha256::digest(text.as_bytes());
        (0..self.dim)
            .map(|i| (hash[i % 32] as f32 / 127.5) - 1.0)
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> ProviderResult<Vec<f32>> {
        self.calls.write().unwrap().push(text.to_string());
        if self.failing {
            return Err(ProviderError::Unavailable("mock embedder down".into()));
        }

        if let Some(embedding) = self.embeddings.read().unwrap().get(text) {
            return Ok(embedding.clone());
        }
        if let Some(embedding) = self.default_embedding.read().unwrap().as_ref() {
            return Ok(embedding.clone());
        }
        Ok(self.deterministic_embedding(text))
    }
}

// ============================================================================
// NLI
// ============================================================================

/// Mock NLI classifier labelling pairs by premise substring.
#[derive(Clone)]
pub struct MockClassifier {
    rules: Arc<RwLock<Vec<(String, NliScores)>>>,
    default_scores: NliScores,
    failing: bool,
    batches: Arc<RwLock<Vec<usize>>>,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self {
            rules: Arc::default(),
            default_scores: scores_for(NliLabel::Neutral, 0.9),
            failing: false,
            batches: Arc::default(),
        }
    }
}

/// Scores with `score` on `label` and the remainder split evenly.
pub fn scores_for(label: NliLabel, score: f32) -> NliScores {
    let rest = (1.0 - score).max(0.0) / 2.0;
    let mut scores = NliScores {
        entails: rest,
        contradicts: rest,
        neutral: rest,
    };
    match label {
        NliLabel::Entails => scores.entails = score,
        NliLabel::Contradicts => scores.contradicts = score,
        NliLabel::Neutral => scores.neutral = score,
    }
    scores
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label every pair this way unless a premise rule matches.
    pub fn labelling_all(mut self, label: NliLabel, score: f32) -> Self {
        self.default_scores = scores_for(label, score);
        self
    }

    /// Label pairs whose premise contains `needle`.
    pub fn with_label(self, needle: impl Into<String>, label: NliLabel, score: f32) -> Self {
        self.rules
            .write()
            .unwrap()
            .push((needle.into(), scores_for(label, score)));
        self
    }

    /// Answer every pair with these scores verbatim.
    pub fn with_raw_scores(mut self, scores: NliScores) -> Self {
        self.default_scores = scores;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Sizes of the batches received, in call order.
    pub fn batches(&self) -> Vec<usize> {
        self.batches.read().unwrap().clone()
    }
}

#[async_trait]
impl NliClassifier for MockClassifier {
    async fn classify_batch(&self, pairs: &[NliPair]) -> ProviderResult<Vec<NliScores>> {
        self.batches.write().unwrap().push(pairs.len());
        if self.failing {
            return Err(ProviderError::Unavailable("mock NLI model down".into()));
        }

        let rules = self.rules.read().unwrap();
        Ok(pairs
            .iter()
            .map(|pair| {
                rules
                    .iter()
                    .find(|(needle, _)| pair.premise.contains(needle.as_str()))
                    .map(|(_, scores)| *scores)
                    .unwrap_or(self.default_scores)
            })
            .collect())
    }
}

// ============================================================================
// Completion model
// ============================================================================

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Fail(MockFailure),
}

/// Mock completion model answering by schema name.
///
/// Resolution order per call: queued replies for the schema, then rules
/// whose needle appears in the prompt, then the schema default.
#[derive(Clone, Default)]
pub struct MockCompletion {
    queued: Arc<RwLock<HashMap<String, VecDeque<MockReply>>>>,
    rules: Arc<RwLock<Vec<(String, String, String)>>>,
    defaults: Arc<RwLock<HashMap<String, MockReply>>>,
    hanging: Arc<RwLock<HashSet<String>>>,
    calls: Arc<RwLock<Vec<CompletionRequest>>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default extractor output: this list of claims.
    pub fn with_claims(self, claims: &[&str]) -> Self {
        let body = serde_json::json!({ "claims": claims }).to_string();
        self.with_default(EXTRACT_SCHEMA_NAME, body)
    }

    /// Default judge output for every claim.
    pub fn with_verdict(self, verdict: Verdict, confidence: f32, rationale: &str) -> Self {
        self.with_default(JUDGE_SCHEMA_NAME, verdict_json(verdict, confidence, rationale))
    }

    /// Judge output for claims whose prompt mentions `needle`.
    pub fn with_verdict_for(
        self,
        needle: &str,
        verdict: Verdict,
        confidence: f32,
        rationale: &str,
    ) -> Self {
        self.rules.write().unwrap().push((
            JUDGE_SCHEMA_NAME.to_string(),
            needle.to_string(),
            verdict_json(verdict, confidence, rationale),
        ));
        self
    }

    pub fn with_default(self, schema: &str, body: impl Into<String>) -> Self {
        self.defaults
            .write()
            .unwrap()
            .insert(schema.to_string(), MockReply::Text(body.into()));
        self
    }

    pub fn failing_default(self, schema: &str, failure: MockFailure) -> Self {
        self.defaults
            .write()
            .unwrap()
            .insert(schema.to_string(), MockReply::Fail(failure));
        self
    }

    /// Queue a one-shot raw reply for a schema.
    pub fn then_reply(self, schema: &str, body: impl Into<String>) -> Self {
        self.push(schema, MockReply::Text(body.into()))
    }

    /// Queue a one-shot failure for a schema.
    pub fn then_fail(self, schema: &str, failure: MockFailure) -> Self {
        self.push(schema, MockReply::Fail(failure))
    }

    /// Calls for this schema never return.
    pub fn hanging(self, schema: &str) -> Self {
        self.hanging.write().unwrap().insert(schema.to_string());
        self
    }

    fn push(self, schema: &str, reply: MockReply) -> Self {
        self.queued
            .write()
            .unwrap()
            .entry(schema.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.read().unwrap().clone()
    }

    pub fn calls_for(&self, schema: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.schema_name == schema)
            .count()
    }

    fn resolve(&self, request: &CompletionRequest) -> Option<MockReply> {
        if let Some(reply) = self
            .queued
            .write()
            .unwrap()
            .get_mut(&request.schema_name)
            .and_then(VecDeque::pop_front)
        {
            return Some(reply);
        }

        let rule = self
            .rules
            .read()
            .unwrap()
            .iter()
            .find(|(schema, needle, _)| {
                *schema == request.schema_name && request.prompt.contains(needle.as_str())
            })
            .map(|(_, _, body)| MockReply::Text(body.clone()));
        if rule.is_some() {
            return rule;
        }

        self.defaults
            .read()
            .unwrap()
            .get(&request.schema_name)
            .cloned()
    }
}

fn verdict_json(verdict: Verdict, confidence: f32, rationale: &str) -> String {
    serde_json::json!({
        "verdict": verdict,
        "confidence": confidence,
        "rationale": rationale,
    })
    .to_string()
}

#[async_trait]
impl CompletionModel for MockCompletion {
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        self.calls.write().unwrap().push(request.clone());

        let hangs = self.hanging.read().unwrap().contains(&request.schema_name);
        if hangs {
            std::future::pending::<()>().await;
        }

        match self.resolve(request) {
            Some(MockReply::Text(body)) => Ok(body),
            Some(MockReply::Fail(failure)) => Err(failure.to_error()),
            None => Err(ProviderError::Unavailable(format!(
                "no canned reply for schema {}",
                request.schema_name
            ))),
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Cache backend that is always down.
#[derive(Clone, Copy, Default)]
pub struct FailingCache;

#[async_trait]
impl EvidenceCache for FailingCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<serde_json::Value>, CacheError> {
        Err(CacheError::Unavailable("mock cache down".into()))
    }

    async fn put(
        &self,
        _key: &CacheKey,
        _value: serde_json::Value,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("mock cache down".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_tracks_calls() {
        let fetcher = MockFetcher::new().with_html("https://a.com", "<p>hi</p>");
        let shared = fetcher.clone();

        assert!(fetcher.fetch("https://a.com").await.is_ok());
        assert!(fetcher.fetch("https://missing.com").await.is_err());
        assert_eq!(shared.calls(), vec!["https://a.com", "https://missing.com"]);
    }

    #[tokio::test]
    async fn test_mock_completion_resolution_order() {
        let model = MockCompletion::new()
            .with_verdict(Verdict::Uncertain, 0.2, "default")
            .with_verdict_for("Paris", Verdict::Supported, 0.9, "rule")
            .then_fail(JUDGE_SCHEMA_NAME, MockFailure::Timeout);

        let request = |prompt: &str| {
            CompletionRequest::new("sys", prompt, JUDGE_SCHEMA_NAME, serde_json::json!({}))
        };

        assert!(matches!(
            model.complete(&request("Paris is in France")).await,
            Err(ProviderError::Timeout)
        ));
        assert!(model
            .complete(&request("Paris is in France"))
            .await
            .unwrap()
            .contains("rule"));
        assert!(model
            .complete(&request("Rome"))
            .await
            .unwrap()
            .contains("default"));
        assert_eq!(model.calls_for(JUDGE_SCHEMA_NAME), 3);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new();
        let a = embedder.embed("same text").await.unwrap();
        let b = embedder.embed("same text").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn test_mock_classifier_rules() {
        let classifier = MockClassifier::new()
            .labelling_all(NliLabel::Entails, 0.8)
            .with_label("flat", NliLabel::Contradicts, 0.95);

        let (label, score) = classifier
            .classify("The Earth is flat", "claim")
            .await
            .unwrap();
        assert_eq!(label, NliLabel::Contradicts);
        assert!((score - 0.95).abs() < 1e-6);

        let (label, _) = classifier.classify("round", "claim").await.unwrap();
        assert_eq!(label, NliLabel::Entails);
        assert_eq!(classifier.batches(), vec![1, 1]);
    }
}
