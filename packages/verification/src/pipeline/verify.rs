//! NLI verification: label every evidence snippet against its claim.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use crate::error::VerificationError;
use crate::traits::classifier::{NliClassifier, NliPair, NliScores};
use crate::types::claim::Claim;
use crate::types::evidence::{EvidenceSnippet, NliLabel};

/// Weighted vote over a claim's labelled evidence.
///
/// Each snippet weighs `relevance * credibility`; entailing and
/// contradicting snippets also scale that weight by the classifier score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NliAggregate {
    pub entail_weight: f32,
    pub contradict_weight: f32,
    pub total_weight: f32,
}

impl NliAggregate {
    pub fn from_snippets(snippets: &[EvidenceSnippet]) -> Self {
        snippets.iter().fold(Self::default(), |mut acc, snippet| {
            let weight = snippet.weight();
            match snippet.nli_label {
                Some(NliLabel::Entails) => acc.entail_weight += weight * snippet.nli_score,
                Some(NliLabel::Contradicts) => acc.contradict_weight += weight * snippet.nli_score,
                _ => {}
            }
            acc.total_weight += weight;
            acc
        })
    }

    pub fn is_empty(&self) -> bool {
        self.total_weight <= 0.0
    }

    /// Entailment minus contradiction, as a share of total weight.
    pub fn net_entailment(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        (self.entail_weight - self.contradict_weight) / self.total_weight
    }

    pub fn net_contradiction(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        (self.contradict_weight - self.entail_weight) / self.total_weight
    }
}

/// Verifier result for one claim.
#[derive(Debug)]
pub struct Verification {
    /// Every snippet with `nli_label` set
    pub snippets: Vec<EvidenceSnippet>,

    pub aggregate: NliAggregate,

    /// Set when the classifier was unusable and all labels fell back to neutral
    pub degraded: Option<VerificationError>,
}

/// Stage 4: one batched classifier call per claim.
pub struct Verifier {
    classifier: Arc<dyn NliClassifier>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Verifier {
    pub fn new(classifier: Arc<dyn NliClassifier>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            classifier,
            retry,
            timeout,
        }
    }

    /// Label every snippet. Never fails: classifier trouble degrades every
    /// label to neutral and is reported in [`Verification::degraded`].
    pub async fn verify(&self, claim: &Claim, mut snippets: Vec<EvidenceSnippet>) -> Verification {
        if snippets.is_empty() {
            return Verification {
                snippets,
                aggregate: NliAggregate::default(),
                degraded: None,
            };
        }

        let pairs: Vec<NliPair> = snippets
            .iter()
            .map(|s| NliPair {
                premise: s.snippet_text.clone(),
                hypothesis: claim.text.clone(),
            })
            .collect();

        let outcome = tokio::time::timeout(
            self.timeout,
            self.retry
                .run("nli", || self.classifier.classify_batch(&pairs)),
        )
        .await;

        let degraded = match outcome {
            Ok(Ok(scores)) if scores.len() != snippets.len() => Some(format!(
                "classifier returned {} scores for {} pairs",
                scores.len(),
                snippets.len()
            )),
            Ok(Ok(scores)) if !scores.iter().all(NliScores::is_valid) => {
                Some("classifier returned scores outside [0, 1]".to_string())
            }
            Ok(Ok(scores)) => {
                for (snippet, scores) in snippets.iter_mut().zip(scores) {
                    let (label, score) = scores.top();
                    snippet.nli_label = Some(label);
                    snippet.nli_score = score;
                }
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("NLI stage timed out".to_string()),
        };

        let degraded = degraded.map(|reason| {
            warn!(
                claim_id = claim.id,
                reason = %reason,
                "NLI unavailable, treating all evidence as neutral"
            );
            for snippet in snippets.iter_mut() {
                snippet.nli_label = Some(NliLabel::Neutral);
                snippet.nli_score = 0.0;
            }
            VerificationError::ModelUnavailable(reason)
        });

        let aggregate = NliAggregate::from_snippets(&snippets);
        debug!(
            claim_id = claim.id,
            snippets = snippets.len(),
            net_entailment = aggregate.net_entailment(),
            net_contradiction = aggregate.net_contradiction(),
            "Evidence verified"
        );

        Verification {
            snippets,
            aggregate,
            degraded,
        }
    }
}
