//! Prompts and structured-output schemas for the extractor and the judge.

use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write;

use super::verify::NliAggregate;
use crate::traits::completion::CompletionRequest;
use crate::types::evidence::{EvidenceSnippet, NliLabel};

pub const EXTRACT_SCHEMA_NAME: &str = "extracted_claims";
pub const JUDGE_SCHEMA_NAME: &str = "claim_verdict";

/// Extractor output (must be a top-level object for structured output).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtractedClaims {
    /// Standalone factual assertions, in the order they appear.
    pub claims: Vec<String>,
}

/// Judge output for one claim.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct JudgeOutput {
    /// One of "supported", "contradicted", "uncertain".
    pub verdict: String,

    /// 0.0 to 1.0 (f64 for JsonSchema compatibility)
    pub confidence: f64,

    /// One or two sentences citing the evidence.
    pub rationale: String,
}

const EXTRACT_SYSTEM: &str = r#"You extract checkable factual claims from content.

A claim is a single, standalone factual assertion that could be verified against
external sources. Rewrite each claim so it makes sense without the surrounding
text (resolve pronouns, keep dates and numbers).

Do NOT extract:
- Opinions, preferences, or value judgements
- Questions, instructions, or predictions
- Duplicates of a claim already listed

Return claims in the order they appear. If there are no factual claims, return
an empty claims array."#;

const EXTRACT_STRICT_SUFFIX: &str = r#"

Your previous answer could not be parsed. Respond with ONLY a JSON object of the
form {"claims": ["..."]} and nothing else."#;

const JUDGE_SYSTEM: &str = r#"You are a fact-checking judge.

Given one claim and numbered evidence passages (each with its source, a
credibility prior, and an entailment label from an NLI model), decide whether
the evidence supports the claim, contradicts it, or is insufficient.

Rules:
- verdict must be exactly "supported", "contradicted", or "uncertain"
- Prefer "uncertain" over "contradicted" when evidence is weak or mixed
- confidence is between 0.0 and 1.0
- rationale is one or two sentences referring to evidence by number
- The NLI labels and aggregate are hints, not ground truth"#;

fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default()
}

/// Extractor request. `strict` adds the re-prompt used after a parse failure.
pub fn extract_request(source_text: &str, strict: bool) -> CompletionRequest {
    let system = if strict {
        format!("{}{}", EXTRACT_SYSTEM, EXTRACT_STRICT_SUFFIX)
    } else {
        EXTRACT_SYSTEM.to_string()
    };

    CompletionRequest::new(
        system,
        format!("Extract the factual claims from this content:\n\n{}", source_text),
        EXTRACT_SCHEMA_NAME,
        schema_value::<ExtractedClaims>(),
    )
}

/// Judge request for one claim and its annotated evidence.
pub fn judge_request(
    claim: &str,
    evidence: &[EvidenceSnippet],
    aggregate: &NliAggregate,
) -> CompletionRequest {
    let mut prompt = format!("Claim: {}\n\nEvidence:\n", claim);

    for (i, snippet) in evidence.iter().enumerate() {
        let label = match snippet.nli_label.unwrap_or_default() {
            NliLabel::Entails => "entails",
            NliLabel::Contradicts => "contradicts",
            NliLabel::Neutral => "neutral",
        };
        let date = snippet
            .published_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        let _ = writeln!(
            prompt,
            "[{}] {} ({}, credibility {:.2}, NLI {} {:.2})\n{}\n",
            i + 1,
            snippet.source_domain,
            date,
            snippet.credibility_score,
            label,
            snippet.nli_score,
            snippet.snippet_text
        );
    }

    let _ = write!(
        prompt,
        "Weighted NLI aggregate: net entailment {:.2}, net contradiction {:.2}.",
        aggregate.net_entailment(),
        aggregate.net_contradiction()
    );

    CompletionRequest::new(
        JUDGE_SYSTEM,
        prompt,
        JUDGE_SCHEMA_NAME,
        schema_value::<JudgeOutput>(),
    )
}
