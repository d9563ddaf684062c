//! Integration tests for the full verification pipeline.
//!
//! Every collaborator is a mock from `verification::testing`, so these
//! exercise the orchestrator end to end:
//! 1. Ingest and extraction
//! 2. Per-claim retrieve → verify → judge fan-out
//! 3. Timeouts, cancellation, progress and persistence

use futures::StreamExt;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use verification::{
    pipeline::{NliAggregate, JUDGE_SCHEMA_NAME, EXTRACT_SCHEMA_NAME, TIMED_OUT_RATIONALE},
    testing::{
        MockClassifier, MockCompletion, MockEmbedder, MockFailure, MockFetcher, MockOcr,
        MockSearcher, MockTranscripts,
    },
    CheckRequest, CheckStatus, CredibilityConfig, EvidenceSnippet, ExtractionErrorKind,
    FailureKind, IngestErrorKind, MemoryCache, MemoryResultSink, NliLabel, Pipeline,
    PipelineConfig, SearchResult, Services, Stage, Verdict, VerdictPolicy,
};

const FLAT_EARTH: &str = "The Earth is flat";

/// Mocks plus config; build a pipeline after customizing fields.
struct Harness {
    fetcher: MockFetcher,
    searcher: MockSearcher,
    embedder: MockEmbedder,
    classifier: MockClassifier,
    model: MockCompletion,
    cache: Arc<MemoryCache>,
    sink: Arc<MemoryResultSink>,
    config: PipelineConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            fetcher: MockFetcher::new(),
            searcher: MockSearcher::new(),
            // Identical vectors make every snippet fully relevant.
            embedder: MockEmbedder::new().with_default_embedding(vec![1.0, 0.0]),
            classifier: MockClassifier::new(),
            model: MockCompletion::new(),
            cache: Arc::new(MemoryCache::new()),
            sink: Arc::new(MemoryResultSink::new()),
            config: PipelineConfig::default()
                .with_retry_backoff(Duration::from_millis(1))
                .with_credibility(
                    CredibilityConfig::default().with_tier(&["reuters.com", "apnews.com"], 0.9),
                ),
        }
    }

    fn pipeline(&self) -> Pipeline {
        let services = Services {
            fetcher: Arc::new(self.fetcher.clone()),
            ocr: Arc::new(MockOcr::new()),
            transcripts: Arc::new(MockTranscripts::new()),
            searcher: Arc::new(self.searcher.clone()),
            embedder: Arc::new(self.embedder.clone()),
            classifier: Arc::new(self.classifier.clone()),
            model: Arc::new(self.model.clone()),
            cache: self.cache.clone(),
            sink: Some(self.sink.clone()),
        };
        Pipeline::new(services, self.config.clone())
    }
}

fn flat_earth_evidence() -> MockSearcher {
    MockSearcher::new().with_snippets(
        FLAT_EARTH,
        &[
            ("https://www.reuters.com/science/earth", "Satellite imagery shows Earth is round."),
            ("https://apnews.com/article/earth", "Scientists confirm Earth is an oblate spheroid."),
            ("https://flat-truth.example.net/post", "Photos from orbit show a curved horizon."),
        ],
    )
}

fn generic_evidence() -> Vec<SearchResult> {
    vec![SearchResult::from_url("https://reuters.com/factcheck")
        .expect("valid url")
        .with_snippet("A relevant passage.")]
}

#[tokio::test]
async fn test_end_to_end_contradicted_claim() {
    let mut harness = Harness::new();
    harness.model = MockCompletion::new()
        .with_claims(&[FLAT_EARTH])
        .with_verdict(Verdict::Contradicted, 0.93, "Sources [1] and [2] show the Earth is round.");
    harness.searcher = flat_earth_evidence();
    harness.classifier = MockClassifier::new().labelling_all(NliLabel::Contradicts, 0.95);

    let request = CheckRequest::text("The Earth is flat.").with_reserved_credits(1);
    let result = harness.pipeline().run(request.clone(), CancellationToken::new()).await;

    assert_eq!(result.status, CheckStatus::Completed);
    assert!(result.error.is_none());
    assert_eq!(result.claims.len(), 1);

    let claim = &result.claims[0];
    assert_eq!(claim.claim.text, FLAT_EARTH);
    assert_eq!(claim.claim.verdict, Verdict::Contradicted);
    assert!(claim.claim.confidence >= 0.85);

    let domains: Vec<&str> = claim.evidence.iter().map(|e| e.source_domain.as_str()).collect();
    assert_eq!(domains, vec!["reuters.com", "apnews.com", "flat-truth.example.net"]);
    let credibility: Vec<f32> = claim.evidence.iter().map(|e| e.credibility_score).collect();
    assert_eq!(credibility, vec![0.9, 0.9, 0.6]);
    assert!(claim.evidence.iter().all(|e| e.nli_label == Some(NliLabel::Contradicts)));

    assert_eq!(result.credits.to_finalize, 1);
    assert_eq!(harness.sink.get(&request.id), Some(result));
}

#[tokio::test]
async fn test_fallback_verdict_when_judge_is_down() {
    let mut harness = Harness::new();
    harness.model = MockCompletion::new()
        .with_claims(&[FLAT_EARTH])
        .failing_default(JUDGE_SCHEMA_NAME, MockFailure::Unavailable);
    harness.searcher = flat_earth_evidence();
    harness.classifier = MockClassifier::new().labelling_all(NliLabel::Contradicts, 0.95);

    let result = harness
        .pipeline()
        .run(CheckRequest::text("The Earth is flat."), CancellationToken::new())
        .await;

    let claim = &result.claims[0].claim;
    assert_eq!(claim.verdict, Verdict::Contradicted);
    assert!((claim.confidence - 0.95).abs() < 1e-4);
    assert!(claim.rationale.starts_with("Weighted evidence contradicts the claim"));
}

#[tokio::test]
async fn test_empty_claims_completes_without_error() {
    let mut harness = Harness::new();
    harness.model = MockCompletion::new().with_claims(&[]);

    let result = harness
        .pipeline()
        .run(CheckRequest::text("I like pizza."), CancellationToken::new())
        .await;

    assert_eq!(result.status, CheckStatus::Completed);
    assert!(result.claims.is_empty());
    assert!(result.error.is_none());
    assert!(harness.searcher.calls().is_empty());
}

#[tokio::test]
async fn test_claims_keep_extraction_order() {
    let mut harness = Harness::new();
    harness.config = harness.config.clone().with_claim_concurrency(2);
    harness.model = MockCompletion::new()
        .with_claims(&["Alpha fact", "Beta fact", "Gamma fact"])
        .with_verdict(Verdict::Supported, 0.8, "ok");
    // The first claim finishes last.
    harness.searcher = MockSearcher::new()
        .with_default_results(generic_evidence())
        .with_delay("Alpha fact", Duration::from_millis(150));
    harness.classifier = MockClassifier::new().labelling_all(NliLabel::Entails, 0.9);

    let result = harness
        .pipeline()
        .run(CheckRequest::text("Alpha. Beta. Gamma."), CancellationToken::new())
        .await;

    let texts: Vec<&str> = result.claims.iter().map(|c| c.claim.text.as_str()).collect();
    assert_eq!(texts, vec!["Alpha fact", "Beta fact", "Gamma fact"]);
    let ids: Vec<u32> = result.claims.iter().map(|c| c.claim.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(result.claims.iter().all(|c| c.claim.verdict == Verdict::Supported));
}

#[tokio::test]
async fn test_claim_fan_out_respects_concurrency_bound() {
    let mut harness = Harness::new();
    harness.config = harness.config.clone().with_claim_concurrency(2);
    harness.model = MockCompletion::new()
        .with_claims(&["One fact", "Two fact", "Three fact", "Four fact", "Five fact", "Six fact"])
        .with_verdict(Verdict::Supported, 0.8, "ok");
    harness.searcher = MockSearcher::new()
        .with_default_results(generic_evidence())
        .with_latency(Duration::from_millis(40));
    harness.classifier = MockClassifier::new().labelling_all(NliLabel::Entails, 0.9);

    let result = harness
        .pipeline()
        .run(CheckRequest::text("Six facts."), CancellationToken::new())
        .await;

    assert_eq!(result.status, CheckStatus::Completed);
    assert_eq!(result.claims.len(), 6);
    assert!(result.claims.iter().all(|c| c.claim.verdict == Verdict::Supported));
    assert_eq!(harness.searcher.max_in_flight(), 2);
}

#[tokio::test]
async fn test_nli_outage_degrades_but_completes() {
    let mut harness = Harness::new();
    harness.model = MockCompletion::new().with_claims(&[FLAT_EARTH, "Water is wet"]);
    harness.searcher = MockSearcher::new().with_default_results(generic_evidence());
    harness.classifier = MockClassifier::new().failing();

    let result = harness
        .pipeline()
        .run(CheckRequest::text("The Earth is flat. Water is wet."), CancellationToken::new())
        .await;

    assert_eq!(result.status, CheckStatus::Completed);
    assert_eq!(result.claims.len(), 2);
    for claim in &result.claims {
        assert!(claim.claim.verdict.is_terminal());
        assert!(!claim.evidence.is_empty());
        for snippet in &claim.evidence {
            assert_eq!(snippet.nli_label, Some(NliLabel::Neutral));
            assert_eq!(snippet.nli_score, 0.0);
        }
    }
}

#[tokio::test]
async fn test_claim_cap_is_deterministic() {
    let texts: Vec<String> = (0..50).map(|i| format!("Claim number {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let mut harness = Harness::new();
    harness.model = MockCompletion::new().with_claims(&refs);
    let pipeline = harness.pipeline();

    let first = pipeline
        .run(CheckRequest::text("Many claims."), CancellationToken::new())
        .await;
    let second = pipeline
        .run(CheckRequest::text("Many claims."), CancellationToken::new())
        .await;

    assert_eq!(first.claims.len(), 20);
    let first_texts: Vec<&str> = first.claims.iter().map(|c| c.claim.text.as_str()).collect();
    let second_texts: Vec<&str> = second.claims.iter().map(|c| c.claim.text.as_str()).collect();
    assert_eq!(first_texts, refs[..20].to_vec());
    assert_eq!(first_texts, second_texts);
    // No evidence anywhere: every claim settles as uncertain.
    assert!(first.claims.iter().all(|c| c.claim.verdict == Verdict::Uncertain));
}

#[tokio::test]
async fn test_hung_retrieval_ends_at_run_timeout() {
    let mut harness = Harness::new();
    harness.config = harness.config.clone().with_run_timeout(Duration::from_millis(300));
    harness.model = MockCompletion::new().with_claims(&[FLAT_EARTH]);
    harness.searcher = MockSearcher::new().hanging();

    let started = Instant::now();
    let result = harness
        .pipeline()
        .run(CheckRequest::text("The Earth is flat."), CancellationToken::new())
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.status, CheckStatus::Completed);
    assert_eq!(result.claims.len(), 1);
    assert_eq!(result.claims[0].claim.verdict, Verdict::Uncertain);
    assert_eq!(result.claims[0].claim.rationale, TIMED_OUT_RATIONALE);
}

#[tokio::test]
async fn test_run_timeout_before_claims_fails_the_run() {
    let mut harness = Harness::new();
    harness.config = harness.config.clone().with_run_timeout(Duration::from_millis(200));
    harness.model = MockCompletion::new().hanging(EXTRACT_SCHEMA_NAME);

    let result = harness
        .pipeline()
        .run(CheckRequest::text("The Earth is flat.").with_reserved_credits(2), CancellationToken::new())
        .await;

    assert_eq!(result.status, CheckStatus::Failed);
    let error = result.error.expect("failure payload");
    assert_eq!(error.kind, FailureKind::RunTimeout);
    assert_eq!(error.stage, Stage::Extracting);
    assert_eq!(result.credits.to_finalize, 0);
}

#[tokio::test]
async fn test_repeated_url_ingest_is_served_from_cache() {
    let mut harness = Harness::new();
    harness.fetcher = MockFetcher::new().with_html(
        "https://news.example.com/story",
        "<article><p>The Earth is flat, the author claims.</p></article>",
    );
    harness.model = MockCompletion::new().with_claims(&[FLAT_EARTH]);
    let pipeline = harness.pipeline();

    let first = pipeline
        .run(CheckRequest::url("https://news.example.com/story"), CancellationToken::new())
        .await;
    let second = pipeline
        .run(CheckRequest::url("https://news.example.com/story"), CancellationToken::new())
        .await;

    assert_eq!(first.status, CheckStatus::Completed);
    assert_eq!(second.status, CheckStatus::Completed);
    assert_eq!(harness.fetcher.fetch_count(), 1);

    let prompts: Vec<String> = harness
        .model
        .calls()
        .into_iter()
        .filter(|c| c.schema_name == EXTRACT_SCHEMA_NAME)
        .map(|c| c.prompt)
        .collect();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn test_ingest_failure_is_fatal() {
    let harness = Harness::new();
    let result = harness
        .pipeline()
        .run(CheckRequest::url("ftp://files.example.com/claims.txt"), CancellationToken::new())
        .await;

    assert_eq!(result.status, CheckStatus::Failed);
    assert!(result.claims.is_empty());
    let error = result.error.expect("failure payload");
    assert_eq!(error.stage, Stage::Ingesting);
    assert_eq!(error.kind, FailureKind::Ingest(IngestErrorKind::UnsupportedInput));
}

#[tokio::test]
async fn test_extractor_refusal_is_fatal() {
    let mut harness = Harness::new();
    harness.model = MockCompletion::new().failing_default(EXTRACT_SCHEMA_NAME, MockFailure::Refused);

    let result = harness
        .pipeline()
        .run(CheckRequest::text("Some text."), CancellationToken::new())
        .await;

    assert_eq!(result.status, CheckStatus::Failed);
    assert_eq!(
        result.error.map(|e| e.kind),
        Some(FailureKind::Extraction(ExtractionErrorKind::ModelRefused))
    );
}

#[tokio::test]
async fn test_cancellation_during_fan_out() {
    let mut harness = Harness::new();
    harness.model = MockCompletion::new().with_claims(&[FLAT_EARTH]);
    harness.searcher = MockSearcher::new().hanging();

    let handle = harness
        .pipeline()
        .spawn(CheckRequest::text("The Earth is flat.").with_reserved_credits(3));
    let mut snapshots = handle.watch();
    snapshots
        .wait_for(|s| s.stage == Stage::Retrieving)
        .await
        .expect("run reaches retrieval");

    handle.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), handle.result())
        .await
        .expect("cancelled run finishes promptly")
        .expect("run task completes");

    assert_eq!(result.status, CheckStatus::Cancelled);
    assert_eq!(result.credits.to_finalize, 0);
    assert_eq!(result.credits.reserved, 3);
}

#[tokio::test]
async fn test_progress_events_are_monotonic() {
    let mut harness = Harness::new();
    harness.model = MockCompletion::new()
        .with_claims(&[FLAT_EARTH, "Water is wet", "Fire is hot"])
        .with_verdict(Verdict::Supported, 0.7, "ok");
    harness.searcher = MockSearcher::new().with_default_results(generic_evidence());

    let mut handle = harness.pipeline().spawn(CheckRequest::text("Three claims."));
    let events: Vec<_> = handle.events().collect().await;
    let result = handle.result().await.expect("run task completes");

    assert!(events.windows(2).all(|w| w[0].progress_percent <= w[1].progress_percent));
    assert_eq!(events.first().map(|e| e.stage), Some(Stage::Queued));
    let last = events.last().expect("events emitted");
    assert_eq!(last.stage, Stage::Completed);
    assert_eq!(last.progress_percent, 100);

    let ingest_events: Vec<u8> = events
        .iter()
        .filter(|e| e.stage == Stage::Ingesting)
        .map(|e| e.progress_percent)
        .collect();
    assert_eq!(ingest_events, vec![5, 15]);
    let normalized = events.iter().position(|e| e.message.starts_with("input normalized"));
    let extracting = events.iter().position(|e| e.stage == Stage::Extracting);
    assert!(normalized.is_some() && normalized < extracting);

    let timed: Vec<Stage> = result.timings.iter().map(|t| t.stage).collect();
    assert_eq!(timed[..3], [Stage::Ingesting, Stage::Extracting, Stage::Retrieving]);
}

/// Low-relevance snippets of any label, so a strong anchor usually dominates.
fn weak_snippet_strategy() -> impl Strategy<Value = EvidenceSnippet> {
    (
        prop_oneof![
            Just(NliLabel::Entails),
            Just(NliLabel::Contradicts),
            Just(NliLabel::Neutral)
        ],
        0.0f32..=1.0,
        0.0f32..=0.2,
        0.0f32..=1.0,
    )
        .prop_map(|(label, score, relevance, credibility)| {
            EvidenceSnippet::new(0, "https://example.org/e", "evidence")
                .with_scores(relevance, credibility)
                .with_nli(label, score)
        })
}

proptest! {
    #[test]
    fn prop_entailing_evidence_never_flips_supported_to_contradicted(
        anchor_score in 0.8f32..=1.0,
        others in prop::collection::vec(weak_snippet_strategy(), 0..4),
        score in 0.0f32..=1.0,
        relevance in 0.0f32..=1.0,
        credibility in 0.0f32..=1.0,
    ) {
        let mut existing = vec![
            EvidenceSnippet::new(0, "https://nasa.gov/anchor", "anchor")
                .with_scores(1.0, 1.0)
                .with_nli(NliLabel::Entails, anchor_score),
        ];
        existing.extend(others);

        let policy = VerdictPolicy::default();
        let before = policy.decide(&NliAggregate::from_snippets(&existing)).0;
        prop_assume!(before == Verdict::Supported);

        let mut extended = existing.clone();
        extended.push(
            EvidenceSnippet::new(0, "https://example.org/new", "more evidence")
                .with_scores(relevance, credibility)
                .with_nli(NliLabel::Entails, score),
        );
        let after = policy.decide(&NliAggregate::from_snippets(&extended)).0;
        prop_assert_ne!(after, Verdict::Contradicted);
    }
}
