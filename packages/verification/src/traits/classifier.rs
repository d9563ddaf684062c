//! Natural-language-inference classifier trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::types::claim::clamp_unit;
use crate::types::evidence::NliLabel;

/// One premise/hypothesis pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NliPair {
    /// Evidence text
    pub premise: String,

    /// Claim text
    pub hypothesis: String,
}

/// Class scores for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NliScores {
    pub entails: f32,
    pub contradicts: f32,
    pub neutral: f32,
}

impl NliScores {
    /// Every score is a finite probability in [0, 1].
    pub fn is_valid(&self) -> bool {
        [self.entails, self.contradicts, self.neutral]
            .iter()
            .all(|s| s.is_finite() && (0.0..=1.0).contains(s))
    }

    /// Highest-scoring label and its score, clamped to [0, 1]. Ties resolve
    /// to neutral first, then contradicts.
    pub fn top(&self) -> (NliLabel, f32) {
        let mut best = (NliLabel::Neutral, self.neutral);
        if self.contradicts > best.1 {
            best = (NliLabel::Contradicts, self.contradicts);
        }
        if self.entails > best.1 {
            best = (NliLabel::Entails, self.entails);
        }
        (best.0, clamp_unit(best.1))
    }
}

/// Classifies premise/hypothesis pairs.
///
/// Batching is the primary entry point: the verifier sends every pair for
/// a claim in one call.
#[async_trait]
pub trait NliClassifier: Send + Sync {
    /// Scores for each pair, in input order.
    async fn classify_batch(&self, pairs: &[NliPair]) -> ProviderResult<Vec<NliScores>>;

    /// Classify a single pair.
    async fn classify(&self, premise: &str, hypothesis: &str) -> ProviderResult<(NliLabel, f32)> {
        let pair = NliPair {
            premise: premise.to_string(),
            hypothesis: hypothesis.to_string(),
        };
        let scores = self.classify_batch(std::slice::from_ref(&pair)).await?;
        scores
            .first()
            .map(NliScores::top)
            .ok_or_else(|| ProviderError::InvalidResponse("empty NLI response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_label() {
        let scores = NliScores {
            entails: 0.1,
            contradicts: 0.85,
            neutral: 0.05,
        };
        assert_eq!(scores.top(), (NliLabel::Contradicts, 0.85));

        let tie = NliScores {
            entails: 0.4,
            contradicts: 0.4,
            neutral: 0.2,
        };
        assert_eq!(tie.top().0, NliLabel::Contradicts);
    }
}
