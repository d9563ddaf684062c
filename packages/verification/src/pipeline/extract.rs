//! Claim extraction: one structured-output model call per check.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::prompts::{extract_request, ExtractedClaims};
use super::retry::RetryPolicy;
use super::sanitize::{mentions_date, split_sentences, truncate_chars};
use crate::error::ExtractionError;
use crate::traits::completion::CompletionModel;
use crate::types::claim::Claim;
use crate::types::content::NormalizedContent;

/// Stage 2: extract an ordered, capped list of claims.
pub struct ClaimExtractor {
    model: Arc<dyn CompletionModel>,
    retry: RetryPolicy,
    timeout: Duration,
    max_claims: usize,
    max_input_chars: usize,
}

impl ClaimExtractor {
    pub fn new(
        model: Arc<dyn CompletionModel>,
        retry: RetryPolicy,
        timeout: Duration,
        max_claims: usize,
        max_input_chars: usize,
    ) -> Self {
        Self {
            model,
            retry,
            timeout,
            max_claims,
            max_input_chars,
        }
    }

    /// Extract claims in source order. Zero claims is a valid outcome.
    pub async fn extract(
        &self,
        content: &NormalizedContent,
        check_id: Uuid,
    ) -> Result<Vec<Claim>, ExtractionError> {
        let input = budget_input(&content.source_text, self.max_input_chars);

        let raw = tokio::time::timeout(self.timeout, self.request_claims(&input))
            .await
            .map_err(|_| ExtractionError::ModelTimeout)??;

        let returned = raw.len();
        let texts = normalize_claims(raw, self.max_claims);
        if returned > self.max_claims {
            warn!(
                check_id = %check_id,
                returned = returned,
                kept = texts.len(),
                "Extractor returned more claims than the cap, truncating"
            );
        }
        info!(check_id = %check_id, claims = texts.len(), "Claims extracted");

        Ok(texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Claim::new(i as u32, check_id, text))
            .collect())
    }

    /// One lenient attempt, then one stricter re-prompt on a parse failure.
    async fn request_claims(&self, input: &str) -> Result<Vec<String>, ExtractionError> {
        let lenient = extract_request(input, false);
        let raw = self
            .retry
            .run("extract", || self.model.complete(&lenient))
            .await?;

        match parse_claims(&raw) {
            Ok(claims) => Ok(claims),
            Err(first) => {
                warn!(error = %first, "Extractor output unparseable, re-prompting");
                let strict = extract_request(input, true);
                let raw = self
                    .retry
                    .run("extract", || self.model.complete(&strict))
                    .await?;
                parse_claims(&raw).map_err(|e| ExtractionError::MalformedOutput(e.to_string()))
            }
        }
    }
}

fn parse_claims(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str::<ExtractedClaims>(strip_code_fence(raw)).map(|parsed| parsed.claims)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Collapse whitespace, drop empties and case-insensitive duplicates, then
/// keep the first `max` in order.
pub fn normalize_claims(raw: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|claim| claim.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|claim| !claim.is_empty())
        .filter(|claim| seen.insert(claim.to_lowercase()))
        .take(max)
        .collect()
}

/// Bound the extractor input to `max_chars`.
///
/// Leading sentences fill up to two thirds of the budget, date-bearing
/// sentences from the rest come next, then any remaining leading sentences.
/// Kept sentences stay in source order.
pub fn budget_input(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let sentences = split_sentences(text);
    let lengths: Vec<usize> = sentences.iter().map(|s| s.chars().count() + 1).collect();
    let mut kept = BTreeSet::new();
    let mut used = 0;

    let lead_budget = max_chars * 2 / 3;
    for (i, len) in lengths.iter().enumerate() {
        if used + len > lead_budget {
            break;
        }
        kept.insert(i);
        used += len;
    }

    let dated = (0..sentences.len()).filter(|i| mentions_date(&sentences[*i]));
    for i in dated.chain(0..sentences.len()) {
        if !kept.contains(&i) && used + lengths[i] <= max_chars {
            kept.insert(i);
            used += lengths[i];
        }
    }

    if kept.is_empty() {
        return truncate_chars(text, max_chars).to_string();
    }

    kept.into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::prompts::EXTRACT_SCHEMA_NAME;
    use crate::testing::{MockCompletion, MockFailure};
    use crate::error::ExtractionErrorKind;

    fn extractor(model: MockCompletion) -> ClaimExtractor {
        ClaimExtractor::new(
            Arc::new(model),
            RetryPolicy::new(Duration::from_millis(200), Duration::from_millis(1)),
            Duration::from_secs(1),
            20,
            2_000,
        )
    }

    fn content(text: &str) -> NormalizedContent {
        NormalizedContent::new(text, "hash")
    }

    #[tokio::test]
    async fn test_claims_keep_model_order() {
        let model = MockCompletion::new().with_claims(&["B happened", "A happened"]);
        let claims = extractor(model)
            .extract(&content("B happened. A happened."), Uuid::nil())
            .await
            .unwrap();

        let texts: Vec<_> = claims.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["B happened", "A happened"]);
        assert_eq!(claims[1].id, 1);
    }

    #[tokio::test]
    async fn test_malformed_output_gets_one_strict_retry() {
        let model = MockCompletion::new()
            .then_reply(EXTRACT_SCHEMA_NAME, "Sure! Here are the claims: ...")
            .with_claims(&["Water boils at 100C at sea level"]);
        let shared = model.clone();

        let claims = extractor(model)
            .extract(&content("Water boils at 100C at sea level."), Uuid::nil())
            .await
            .unwrap();

        assert_eq!(claims.len(), 1);
        let calls = shared.calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].system, calls[1].system);
    }

    #[tokio::test]
    async fn test_malformed_twice_fails() {
        let model = MockCompletion::new().with_default(EXTRACT_SCHEMA_NAME, "not json");
        let err = extractor(model)
            .extract(&content("text"), Uuid::nil())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExtractionErrorKind::MalformedOutput);
    }

    #[tokio::test]
    async fn test_refusal_is_not_retried() {
        let model = MockCompletion::new().failing_default(EXTRACT_SCHEMA_NAME, MockFailure::Refused);
        let shared = model.clone();
        let err = extractor(model)
            .extract(&content("text"), Uuid::nil())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExtractionErrorKind::ModelRefused);
        assert_eq!(shared.calls_for(EXTRACT_SCHEMA_NAME), 1);
    }

    #[tokio::test]
    async fn test_hung_model_times_out() {
        let model = MockCompletion::new().hanging(EXTRACT_SCHEMA_NAME);
        let extractor = ClaimExtractor::new(
            Arc::new(model),
            RetryPolicy::new(Duration::from_secs(5), Duration::from_millis(1)),
            Duration::from_millis(50),
            20,
            2_000,
        );
        let err = extractor
            .extract(&content("text"), Uuid::nil())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExtractionErrorKind::ModelTimeout);
    }

    #[tokio::test]
    async fn test_zero_claims_is_success() {
        let model = MockCompletion::new().with_claims(&[]);
        let claims = extractor(model)
            .extract(&content("I like pizza."), Uuid::nil())
            .await
            .unwrap();
        assert!(claims.is_empty());
    }

    #[test]
    fn test_normalize_claims() {
        let raw = vec![
            "  The  Earth is flat ".to_string(),
            "".to_string(),
            "the earth is FLAT".to_string(),
            "Water is wet".to_string(),
            "Fire is hot".to_string(),
        ];
        assert_eq!(
            normalize_claims(raw, 2),
            vec!["The Earth is flat", "Water is wet"]
        );
    }

    #[test]
    fn test_code_fence_tolerated() {
        let raw = "```json\n{\"claims\": [\"x\"]}\n```";
        assert_eq!(parse_claims(raw).unwrap(), vec!["x"]);
    }

    #[test]
    fn test_budget_keeps_lead_and_dated_sentences() {
        let filler = "Filler sentence without anything notable.";
        let mut text = String::from("Lead sentence one. ");
        for _ in 0..20 {
            text.push_str(filler);
            text.push(' ');
        }
        text.push_str("The treaty was signed on June 5, 1998.");

        let budgeted = budget_input(&text, 150);
        assert!(budgeted.chars().count() <= 150);
        assert!(budgeted.starts_with("Lead sentence one."));
        assert!(budgeted.ends_with("The treaty was signed on June 5, 1998."));
    }

    #[test]
    fn test_budget_short_text_untouched() {
        assert_eq!(budget_input("Short.", 100), "Short.");
    }
}
