//! In-memory working state of one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use super::progress::ProgressReporter;
use crate::error::PipelineError;
use crate::types::claim::{Claim, Verdict, VerifiedClaim};
use crate::types::progress::Stage;
use crate::types::result::{CheckResult, CheckStatus, CreditSettlement, StageTiming};

/// Point-in-time view of a run, for clients that reconnect mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub check_id: Uuid,
    pub stage: Stage,
    pub progress_percent: u8,

    /// Claims in extraction order, pending until judged
    pub claims: Vec<Claim>,

    /// Degraded-path notes collected so far
    pub errors: Vec<String>,

    pub timings: Vec<StageTiming>,
    pub updated_at: DateTime<Utc>,
}

impl RunSnapshot {
    pub fn queued(check_id: Uuid) -> Self {
        Self {
            check_id,
            stage: Stage::Queued,
            progress_percent: 0,
            claims: Vec::new(),
            errors: Vec::new(),
            timings: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Current stage, stage timings, accumulated claims and errors.
///
/// Every mutation republishes the [`RunSnapshot`] and, for stage changes,
/// emits a progress event.
pub struct PipelineRun {
    check_id: Uuid,
    reserved_credits: u32,
    stage: Stage,
    timings: Vec<StageTiming>,
    claims: Vec<VerifiedClaim>,
    errors: Vec<String>,
    progress: Arc<ProgressReporter>,
    snapshot: watch::Sender<RunSnapshot>,
}

impl PipelineRun {
    pub fn new(
        check_id: Uuid,
        reserved_credits: u32,
        progress: Arc<ProgressReporter>,
        snapshot: watch::Sender<RunSnapshot>,
    ) -> Self {
        let run = Self {
            check_id,
            reserved_credits,
            stage: Stage::Queued,
            timings: Vec::new(),
            claims: Vec::new(),
            errors: Vec::new(),
            progress,
            snapshot,
        };
        run.progress.enter(Stage::Queued, "queued");
        run.publish();
        run
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn has_claims(&self) -> bool {
        !self.claims.is_empty()
    }

    /// Move to `stage` at its base percent.
    pub fn enter(&mut self, stage: Stage, message: impl Into<String>) {
        let percent = stage.base_percent().unwrap_or_else(|| self.progress.percent());
        self.transition(stage, percent, message);
    }

    /// Report `stage` at `percent`. Same-stage calls are heartbeats.
    pub fn transition(&mut self, stage: Stage, percent: u8, message: impl Into<String>) {
        if stage != self.stage {
            let now = Utc::now();
            if let Some(open) = self.timings.last_mut().filter(|t| t.finished_at.is_none()) {
                open.finished_at = Some(now);
            }
            if !stage.is_terminal() {
                self.timings.push(StageTiming {
                    stage,
                    started_at: now,
                    finished_at: None,
                });
            }
            self.stage = stage;
        }
        self.progress.emit(stage, percent, message);
        self.publish();
    }

    /// Register extracted claims, all pending.
    pub fn set_claims(&mut self, claims: Vec<Claim>) {
        self.claims = claims
            .into_iter()
            .map(|claim| VerifiedClaim {
                claim,
                evidence: Vec::new(),
            })
            .collect();
        self.publish();
    }

    /// Store a finished claim in its extraction-order slot.
    pub fn record_claim(&mut self, verified: VerifiedClaim) {
        let slot = verified.claim.id as usize;
        if let Some(existing) = self.claims.get_mut(slot) {
            *existing = verified;
        }
        self.publish();
    }

    pub fn record_error(&mut self, note: impl Into<String>) {
        self.errors.push(note.into());
        self.publish();
    }

    /// Settle every still-pending claim as uncertain.
    pub fn resolve_pending(&mut self, rationale: &str) -> usize {
        let mut resolved = 0;
        for verified in self.claims.iter_mut() {
            if verified.claim.verdict == Verdict::Pending {
                verified.claim.resolve(Verdict::Uncertain, 0.0, rationale);
                resolved += 1;
            }
        }
        self.publish();
        resolved
    }

    /// Close the run and assemble its result.
    pub fn finish(mut self, status: CheckStatus, error: Option<PipelineError>) -> CheckResult {
        let (stage, message) = match status {
            CheckStatus::Completed => (Stage::Completed, "completed".to_string()),
            CheckStatus::Failed => (
                Stage::Failed,
                error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "failed".to_string()),
            ),
            CheckStatus::Cancelled => (Stage::Cancelled, "cancelled".to_string()),
        };
        self.enter(stage, message);

        let claims = match status {
            CheckStatus::Completed => std::mem::take(&mut self.claims),
            CheckStatus::Failed | CheckStatus::Cancelled => Vec::new(),
        };

        CheckResult {
            check_id: self.check_id,
            status,
            claims,
            error,
            credits: CreditSettlement::for_status(status, self.reserved_credits),
            timings: self.timings.clone(),
            finished_at: Utc::now(),
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(RunSnapshot {
            check_id: self.check_id,
            stage: self.stage,
            progress_percent: self.progress.percent(),
            claims: self.claims.iter().map(|v| v.claim.clone()).collect(),
            errors: self.errors.clone(),
            timings: self.timings.clone(),
            updated_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> (PipelineRun, watch::Receiver<RunSnapshot>) {
        let id = Uuid::nil();
        let (tx, rx) = watch::channel(RunSnapshot::queued(id));
        let run = PipelineRun::new(id, 2, Arc::new(ProgressReporter::new(id)), tx);
        (run, rx)
    }

    #[test]
    fn test_stage_timings_recorded() {
        let (mut run, rx) = run();
        run.enter(Stage::Ingesting, "ingesting");
        run.enter(Stage::Extracting, "extracting");
        let result = run.finish(CheckStatus::Completed, None);

        let stages: Vec<Stage> = result.timings.iter().map(|t| t.stage).collect();
        assert_eq!(stages, vec![Stage::Ingesting, Stage::Extracting]);
        assert!(result.timings.iter().all(|t| t.finished_at.is_some()));
        assert_eq!(rx.borrow().stage, Stage::Completed);
        assert_eq!(rx.borrow().progress_percent, 100);
        assert_eq!(result.credits.to_finalize, 2);
    }

    #[test]
    fn test_claims_kept_in_slot_order() {
        let (mut run, rx) = run();
        let id = Uuid::nil();
        run.set_claims(vec![Claim::new(0, id, "a"), Claim::new(1, id, "b")]);

        let mut second = Claim::new(1, id, "b");
        second.resolve(Verdict::Supported, 0.9, "ok");
        run.record_claim(VerifiedClaim {
            claim: second,
            evidence: Vec::new(),
        });
        assert_eq!(rx.borrow().claims[1].verdict, Verdict::Supported);
        assert_eq!(rx.borrow().claims[0].verdict, Verdict::Pending);

        assert_eq!(run.resolve_pending("processing timed out."), 1);
        let result = run.finish(CheckStatus::Completed, None);
        assert_eq!(result.claims[0].claim.verdict, Verdict::Uncertain);
        assert_eq!(result.claims[0].claim.rationale, "processing timed out.");
    }

    #[test]
    fn test_failed_run_releases_credits() {
        let (mut run, _rx) = run();
        run.enter(Stage::Ingesting, "ingesting");
        let result = run.finish(
            CheckStatus::Failed,
            Some(PipelineError::run_timeout(Stage::Ingesting)),
        );
        assert_eq!(result.credits.to_finalize, 0);
        assert!(result.claims.is_empty());
    }
}
