//! Verdict synthesis: the LLM judge and its deterministic fallback.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::prompts::{judge_request, JudgeOutput};
use super::retry::RetryPolicy;
use super::verify::NliAggregate;
use crate::error::JudgeError;
use crate::traits::completion::CompletionModel;
use crate::types::claim::{clamp_unit, Claim, Verdict};
use crate::types::config::VerdictPolicy;
use crate::types::evidence::EvidenceSnippet;

/// Who produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgementSource {
    Model,
    Fallback,
}

/// A settled verdict for one claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub verdict: Verdict,
    pub confidence: f32,
    pub rationale: String,
    pub source: JudgementSource,
}

impl VerdictPolicy {
    /// Deterministic verdict from the weighted NLI aggregate.
    ///
    /// Returns the verdict and its confidence, the winning net share.
    pub fn decide(&self, aggregate: &NliAggregate) -> (Verdict, f32) {
        let net_entail = aggregate.net_entailment();
        let net_contra = aggregate.net_contradiction();

        if net_entail > self.supported_threshold {
            (Verdict::Supported, clamp_unit(net_entail))
        } else if net_contra > self.contradicted_threshold {
            (Verdict::Contradicted, clamp_unit(net_contra))
        } else {
            (Verdict::Uncertain, clamp_unit(net_entail.max(net_contra)))
        }
    }

    /// Rule-based judgement used when the model is unavailable.
    pub fn fallback(&self, aggregate: &NliAggregate) -> Judgement {
        let (verdict, confidence) = self.decide(aggregate);
        let rationale = match verdict {
            Verdict::Supported => format!(
                "Weighted evidence entails the claim (net entailment {:.2}).",
                aggregate.net_entailment()
            ),
            Verdict::Contradicted => format!(
                "Weighted evidence contradicts the claim (net contradiction {:.2}).",
                aggregate.net_contradiction()
            ),
            _ => "Evidence is insufficient or mixed to reach a verdict.".to_string(),
        };

        Judgement {
            verdict,
            confidence,
            rationale,
            source: JudgementSource::Fallback,
        }
    }
}

fn opposed(a: Verdict, b: Verdict) -> bool {
    matches!(
        (a, b),
        (Verdict::Supported, Verdict::Contradicted) | (Verdict::Contradicted, Verdict::Supported)
    )
}

/// Stage 5: ask the model for a verdict, fall back to the policy on failure.
pub struct Judge {
    model: Arc<dyn CompletionModel>,
    policy: VerdictPolicy,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Judge {
    pub fn new(
        model: Arc<dyn CompletionModel>,
        policy: VerdictPolicy,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            policy,
            retry,
            timeout,
        }
    }

    pub fn policy(&self) -> &VerdictPolicy {
        &self.policy
    }

    /// Judge one claim. Always produces a terminal verdict.
    pub async fn judge(
        &self,
        claim: &Claim,
        evidence: &[EvidenceSnippet],
        aggregate: &NliAggregate,
    ) -> Judgement {
        match self.ask_model(claim, evidence, aggregate).await {
            Ok(judgement) => self.sanity_check(claim, aggregate, judgement),
            Err(e) => {
                warn!(claim_id = claim.id, error = %e, "Judge unavailable, using fallback verdict");
                self.policy.fallback(aggregate)
            }
        }
    }

    async fn ask_model(
        &self,
        claim: &Claim,
        evidence: &[EvidenceSnippet],
        aggregate: &NliAggregate,
    ) -> Result<Judgement, JudgeError> {
        let request = judge_request(&claim.text, evidence, aggregate);
        let raw = tokio::time::timeout(
            self.timeout,
            self.retry.run("judge", || self.model.complete(&request)),
        )
        .await
        .map_err(|_| JudgeError::ModelTimeout)??;

        let output: JudgeOutput = serde_json::from_str(raw.trim())
            .map_err(|e| JudgeError::MalformedOutput(e.to_string()))?;
        let verdict = Verdict::parse_terminal(&output.verdict).ok_or_else(|| {
            JudgeError::MalformedOutput(format!("unknown verdict {:?}", output.verdict))
        })?;

        debug!(claim_id = claim.id, verdict = ?verdict, confidence = output.confidence, "Judge answered");
        Ok(Judgement {
            verdict,
            confidence: clamp_unit(output.confidence as f32),
            rationale: output.rationale.trim().to_string(),
            source: JudgementSource::Model,
        })
    }

    /// A model verdict flatly opposed to the weighted evidence is downgraded.
    fn sanity_check(&self, claim: &Claim, aggregate: &NliAggregate, judgement: Judgement) -> Judgement {
        if aggregate.is_empty() {
            return judgement;
        }

        let (rule_verdict, _) = self.policy.decide(aggregate);
        if !opposed(judgement.verdict, rule_verdict) {
            return judgement;
        }

        info!(
            claim_id = claim.id,
            model_verdict = ?judgement.verdict,
            evidence_verdict = ?rule_verdict,
            "Judge verdict contradicts weighted evidence, downgrading to uncertain"
        );
        Judgement {
            verdict: Verdict::Uncertain,
            confidence: judgement.confidence / 2.0,
            rationale: format!(
                "{} (Downgraded: the weighted evidence points the other way.)",
                judgement.rationale
            ),
            source: judgement.source,
        }
    }
}
