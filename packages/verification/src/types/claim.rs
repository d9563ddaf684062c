//! Claims and verdicts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evidence::EvidenceSnippet;

/// Final classification of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Supported,
    Contradicted,
    Uncertain,
    #[default]
    Pending,
}

impl Verdict {
    /// Parse one of the three terminal verdicts. `pending` is not accepted.
    pub fn parse_terminal(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "supported" => Some(Self::Supported),
            "contradicted" => Some(Self::Contradicted),
            "uncertain" => Some(Self::Uncertain),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A single checkable factual assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Position in extraction order, unique within the check
    pub id: u32,

    /// Standalone assertion text
    pub text: String,

    /// Owning check (non-owning back-reference)
    pub check_id: Uuid,

    pub verdict: Verdict,

    /// Confidence in `verdict`, in [0, 1]
    pub confidence: f32,

    /// Human-readable explanation from the judge
    pub rationale: String,
}

impl Claim {
    /// Create a pending claim.
    pub fn new(id: u32, check_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            check_id,
            verdict: Verdict::Pending,
            confidence: 0.0,
            rationale: String::new(),
        }
    }

    /// Settle the claim. Confidence is clamped to [0, 1].
    pub fn resolve(&mut self, verdict: Verdict, confidence: f32, rationale: impl Into<String>) {
        self.verdict = verdict;
        self.confidence = clamp_unit(confidence);
        self.rationale = rationale.into();
    }
}

/// A claim with its final evidence set, as handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaim {
    #[serde(flatten)]
    pub claim: Claim,

    /// Evidence in retrieval order
    pub evidence: Vec<EvidenceSnippet>,
}

/// Clamp a score into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
