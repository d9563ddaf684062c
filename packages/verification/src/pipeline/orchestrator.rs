//! Pipeline orchestrator: drives one check through every stage.
//!
//! Ingest and extraction run sequentially. Claims then fan out through
//! retrieve, verify and judge with bounded concurrency; completions are
//! slotted back into extraction order. The whole run races a deadline and a
//! cancellation token.

use futures::stream::{FuturesUnordered, StreamExt};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cache::CacheLayer;
use super::extract::ClaimExtractor;
use super::ingest::{Ingestor, PageLoader};
use super::judge::{Judge, JudgementSource};
use super::progress::{event_stream, ProgressReporter};
use super::retrieve::EvidenceRetriever;
use super::retry::RetryPolicy;
use super::run::{PipelineRun, RunSnapshot};
use super::verify::Verifier;
use crate::error::{PipelineError, RetrievalError};
use crate::traits::cache::EvidenceCache;
use crate::traits::classifier::NliClassifier;
use crate::traits::completion::CompletionModel;
use crate::traits::embedder::Embedder;
use crate::traits::fetcher::ContentFetcher;
use crate::traits::media::{OcrService, TranscriptService};
use crate::traits::searcher::WebSearcher;
use crate::traits::sink::ResultSink;
use crate::types::claim::{Claim, Verdict, VerifiedClaim};
use crate::types::config::PipelineConfig;
use crate::types::progress::{ProgressEvent, Stage};
use crate::types::request::{CheckRequest, Mode};
use crate::types::result::{CheckResult, CheckStatus};

/// Rationale for claims still pending when the run deadline passes.
pub const TIMED_OUT_RATIONALE: &str = "processing timed out.";

const INGESTED_PERCENT: u8 = 15;
const FANOUT_START: u8 = 35;
const FANOUT_SPAN: u8 = 60;
const STEPS_PER_CLAIM: usize = 3;

/// External collaborators, constructed once per process and shared.
#[derive(Clone)]
pub struct Services {
    pub fetcher: Arc<dyn ContentFetcher>,
    pub ocr: Arc<dyn OcrService>,
    pub transcripts: Arc<dyn TranscriptService>,
    pub searcher: Arc<dyn WebSearcher>,
    pub embedder: Arc<dyn Embedder>,
    pub classifier: Arc<dyn NliClassifier>,

    /// Structured-output model used by the extractor and the judge
    pub model: Arc<dyn CompletionModel>,

    pub cache: Arc<dyn EvidenceCache>,

    /// Receives every finished result, if set
    pub sink: Option<Arc<dyn ResultSink>>,
}

struct Stages {
    config: Arc<PipelineConfig>,
    ingestor: Ingestor,
    extractor: ClaimExtractor,
    retriever: EvidenceRetriever,
    verifier: Verifier,
    judge: Judge,
    sink: Option<Arc<dyn ResultSink>>,
}

/// Runs checks. Cheap to clone; clones share stages and collaborators.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<Stages>,
}

/// Live handle to a spawned run.
pub struct CheckHandle {
    check_id: Uuid,
    cancel: CancellationToken,
    reporter: Weak<ProgressReporter>,
    first_events: Option<broadcast::Receiver<ProgressEvent>>,
    snapshot: watch::Receiver<RunSnapshot>,
    task: JoinHandle<CheckResult>,
}

impl CheckHandle {
    pub fn check_id(&self) -> Uuid {
        self.check_id
    }

    /// Request cancellation. The run finishes with status `cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run, for signal handlers and other tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Progress events. The first call sees every event from the start of
    /// the run; later calls only see events emitted after subscribing.
    /// The stream ends when the run finishes.
    pub fn events(&mut self) -> Pin<Box<dyn Stream<Item = ProgressEvent> + Send>> {
        let receiver = self
            .first_events
            .take()
            .or_else(|| self.reporter.upgrade().map(|r| r.subscribe()));
        match receiver {
            Some(receiver) => event_stream(receiver),
            None => Box::pin(futures::stream::empty()),
        }
    }

    /// Latest snapshot, for clients reconnecting mid-run.
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.clone()
    }

    /// Wait for the run to finish.
    pub async fn result(self) -> Result<CheckResult, tokio::task::JoinError> {
        self.task.await
    }
}

enum Outcome {
    Completed,
    Failed(PipelineError),
    Cancelled,
}

enum Bounded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Per-claim step notification sent from the fan-out workers.
struct ClaimStep {
    claim_id: u32,
    stage: Stage,
    note: Option<String>,
}

impl Pipeline {
    pub fn new(services: Services, config: PipelineConfig) -> Self {
        let config = Arc::new(config);
        let retry = RetryPolicy::from_config(&config);
        let cache = CacheLayer::new(services.cache, config.cache_ttls.clone());
        let pages = PageLoader::new(services.fetcher, cache.clone(), retry, config.max_input_bytes);

        let stages = Stages {
            ingestor: Ingestor::new(
                pages.clone(),
                services.ocr,
                services.transcripts,
                cache.clone(),
                retry,
                config.timeouts.ingest(),
                config.max_input_bytes,
            ),
            extractor: ClaimExtractor::new(
                services.model.clone(),
                retry,
                config.timeouts.extract(),
                config.max_claims,
                config.max_input_chars,
            ),
            retriever: EvidenceRetriever::new(
                services.searcher,
                services.embedder,
                pages,
                cache,
                retry,
                config.clone(),
            ),
            verifier: Verifier::new(services.classifier, retry, config.timeouts.verify()),
            judge: Judge::new(services.model, config.verdict, retry, config.timeouts.judge()),
            sink: services.sink,
            config,
        };

        Self {
            stages: Arc::new(stages),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.stages.config
    }

    /// Run a check to completion on the current task.
    pub async fn run(&self, request: CheckRequest, cancel: CancellationToken) -> CheckResult {
        let reporter = Arc::new(ProgressReporter::new(request.id));
        let (snapshot, _) = watch::channel(RunSnapshot::queued(request.id));
        self.stages.execute(request, cancel, reporter, snapshot).await
    }

    /// Schedule a check as its own task and return a handle to it.
    pub fn spawn(&self, request: CheckRequest) -> CheckHandle {
        let check_id = request.id;
        let cancel = CancellationToken::new();
        let reporter = Arc::new(ProgressReporter::new(check_id));
        let first_events = reporter.subscribe();
        let (snapshot_tx, snapshot_rx) = watch::channel(RunSnapshot::queued(check_id));

        let stages = self.stages.clone();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            let reporter = reporter.clone();
            async move { stages.execute(request, cancel, reporter, snapshot_tx).await }
        });

        CheckHandle {
            check_id,
            cancel,
            reporter: Arc::downgrade(&reporter),
            first_events: Some(first_events),
            snapshot: snapshot_rx,
            task,
        }
    }
}

impl Stages {
    async fn execute(
        &self,
        request: CheckRequest,
        cancel: CancellationToken,
        reporter: Arc<ProgressReporter>,
        snapshot: watch::Sender<RunSnapshot>,
    ) -> CheckResult {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.mode(request.mode).run_timeout();
        let mut run = PipelineRun::new(request.id, request.reserved_credits, reporter, snapshot);

        info!(
            check_id = %request.id,
            input_type = request.input_type.as_str(),
            mode = ?request.mode,
            "Check started"
        );

        let outcome = self.drive(&request, &cancel, deadline, &mut run).await;
        let result = match outcome {
            Outcome::Completed => run.finish(CheckStatus::Completed, None),
            Outcome::Failed(e) => {
                error!(check_id = %request.id, stage = %e.stage, error = %e.message, "Check failed");
                run.finish(CheckStatus::Failed, Some(e))
            }
            Outcome::Cancelled => {
                info!(check_id = %request.id, "Check cancelled");
                run.finish(CheckStatus::Cancelled, None)
            }
        };

        info!(
            check_id = %request.id,
            status = ?result.status,
            claims = result.claims.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Check finished"
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.upsert(&result).await {
                warn!(check_id = %request.id, error = %e, "Failed to persist check result");
            }
        }
        result
    }

    async fn drive(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
        deadline: tokio::time::Instant,
        run: &mut PipelineRun,
    ) -> Outcome {
        run.enter(
            Stage::Ingesting,
            format!("reading {} input", request.input_type.as_str()),
        );
        let content = match bounded(cancel, deadline, self.ingestor.ingest(request)).await {
            Bounded::Done(Ok(content)) => content,
            Bounded::Done(Err(e)) => return Outcome::Failed(e.into()),
            Bounded::TimedOut => return Outcome::Failed(PipelineError::run_timeout(Stage::Ingesting)),
            Bounded::Cancelled => return Outcome::Cancelled,
        };
        run.transition(
            Stage::Ingesting,
            INGESTED_PERCENT,
            format!("input normalized ({} chars)", content.source_text.chars().count()),
        );

        run.enter(Stage::Extracting, "extracting claims");
        let claims = match bounded(cancel, deadline, self.extractor.extract(&content, request.id)).await {
            Bounded::Done(Ok(claims)) => claims,
            Bounded::Done(Err(e)) => return Outcome::Failed(e.into()),
            Bounded::TimedOut => return Outcome::Failed(PipelineError::run_timeout(Stage::Extracting)),
            Bounded::Cancelled => return Outcome::Cancelled,
        };

        if claims.is_empty() {
            info!(check_id = %request.id, "No checkable claims found");
            return Outcome::Completed;
        }

        run.set_claims(claims.clone());
        self.fan_out(request.mode, claims, cancel, deadline, run).await
    }

    async fn fan_out(
        &self,
        mode: Mode,
        claims: Vec<Claim>,
        cancel: &CancellationToken,
        deadline: tokio::time::Instant,
        run: &mut PipelineRun,
    ) -> Outcome {
        let total = claims.len();
        let semaphore = Arc::new(Semaphore::new(self.config.claim_concurrency.max(1)));
        let (step_tx, mut step_rx) = mpsc::unbounded_channel::<ClaimStep>();

        let mut workers = FuturesUnordered::new();
        for claim in claims {
            let semaphore = semaphore.clone();
            let steps = step_tx.clone();
            workers.push(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                self.process_claim(claim, mode, &steps).await
            });
        }
        drop(step_tx);

        run.enter(Stage::Retrieving, format!("checking {} claims", total));
        let mut claim_stages = vec![Stage::Retrieving; total];
        let mut finished = 0;
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Cancelled,
                _ = &mut expiry => {
                    let unresolved = run.resolve_pending(TIMED_OUT_RATIONALE);
                    warn!(unresolved = unresolved, "Run deadline reached, settling pending claims");
                    run.record_error(format!("{} claims timed out", unresolved));
                    return Outcome::Completed;
                }
                Some(verified) = workers.next(), if !workers.is_empty() => {
                    if let Some(slot) = claim_stages.get_mut(verified.claim.id as usize) {
                        *slot = Stage::Completed;
                    }
                    finished += 1;
                    let message = format!("claim {} settled as {:?}", verified.claim.id + 1, verified.claim.verdict);
                    run.record_claim(verified);
                    if finished == total {
                        return Outcome::Completed;
                    }
                    report_fan_out(run, &claim_stages, message);
                }
                Some(step) = step_rx.recv() => {
                    if let Some(note) = step.note {
                        run.record_error(note);
                    }
                    if let Some(slot) = claim_stages.get_mut(step.claim_id as usize) {
                        if step.stage > *slot {
                            *slot = step.stage;
                        }
                    }
                    let message = format!("claim {} {}", step.claim_id + 1, step.stage);
                    report_fan_out(run, &claim_stages, message);
                }
            }
        }
    }

    /// Retrieve, verify and judge one claim. Never fails: every degraded
    /// path still settles the claim.
    async fn process_claim(
        &self,
        mut claim: Claim,
        mode: Mode,
        steps: &mpsc::UnboundedSender<ClaimStep>,
    ) -> VerifiedClaim {
        let claim_id = claim.id;
        let step = |stage: Stage, note: Option<String>| {
            let _ = steps.send(ClaimStep {
                claim_id,
                stage,
                note,
            });
        };

        let evidence = match self.retriever.retrieve(&claim, mode).await {
            Ok(evidence) => evidence,
            Err(e) => {
                let rationale = match &e {
                    RetrievalError::NoResultsFound => {
                        "No evidence was found for this claim.".to_string()
                    }
                    RetrievalError::SearchProviderUnavailable(source) => {
                        format!("Evidence search was unavailable ({}).", source)
                    }
                };
                warn!(claim_id = claim.id, error = %e, "Retrieval failed, claim is uncertain");
                step(Stage::Completed, Some(format!("claim {}: {}", claim.id, e)));
                claim.resolve(Verdict::Uncertain, 0.0, rationale);
                return VerifiedClaim {
                    claim,
                    evidence: Vec::new(),
                };
            }
        };

        step(Stage::Verifying, None);
        let verification = self.verifier.verify(&claim, evidence).await;
        let degraded = verification
            .degraded
            .as_ref()
            .map(|e| format!("claim {}: {}", claim.id, e));

        step(Stage::Judging, degraded);
        let judgement = self
            .judge
            .judge(&claim, &verification.snippets, &verification.aggregate)
            .await;
        if judgement.source == JudgementSource::Fallback {
            step(
                Stage::Judging,
                Some(format!("claim {}: judge unavailable, rule-based verdict", claim.id)),
            );
        }

        claim.resolve(judgement.verdict, judgement.confidence, judgement.rationale);
        VerifiedClaim {
            claim,
            evidence: verification.snippets,
        }
    }
}

/// Report the slowest claim's stage, with percent from completed steps.
fn report_fan_out(run: &mut PipelineRun, claim_stages: &[Stage], message: String) {
    let steps_done: usize = claim_stages.iter().map(|s| steps_for(*s)).sum();
    let steps_total = (claim_stages.len() * STEPS_PER_CLAIM).max(1);
    let percent = FANOUT_START as usize + steps_done * FANOUT_SPAN as usize / steps_total;

    let stage = claim_stages
        .iter()
        .copied()
        .filter(|s| *s != Stage::Completed)
        .min()
        .unwrap_or(Stage::Judging);
    run.transition(stage, percent.min(95) as u8, message);
}

fn steps_for(stage: Stage) -> usize {
    match stage {
        Stage::Verifying => 1,
        Stage::Judging => 2,
        Stage::Completed => STEPS_PER_CLAIM,
        _ => 0,
    }
}

async fn bounded<F: Future>(
    cancel: &CancellationToken,
    deadline: tokio::time::Instant,
    work: F,
) -> Bounded<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        _ = tokio::time::sleep_until(deadline) => Bounded::TimedOut,
        out = work => Bounded::Done(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_percent_and_stage() {
        let id = Uuid::nil();
        let (tx, rx) = watch::channel(RunSnapshot::queued(id));
        let mut run = PipelineRun::new(id, 0, Arc::new(ProgressReporter::new(id)), tx);
        run.enter(Stage::Retrieving, "start");

        report_fan_out(&mut run, &[Stage::Completed, Stage::Verifying], "x".into());
        assert_eq!(rx.borrow().stage, Stage::Verifying);
        // 4 of 6 steps done
        assert_eq!(rx.borrow().progress_percent, 75);

        report_fan_out(&mut run, &[Stage::Completed, Stage::Judging], "y".into());
        assert_eq!(rx.borrow().stage, Stage::Judging);
        assert_eq!(rx.borrow().progress_percent, 85);
    }
}
