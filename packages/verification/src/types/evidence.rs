//! Evidence snippets and NLI labels.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Relationship of an evidence snippet (premise) to a claim (hypothesis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NliLabel {
    Entails,
    Contradicts,
    #[default]
    Neutral,
}

/// A candidate passage of evidence for one claim.
///
/// Created by the retriever, scored by the verifier, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    /// Owning claim
    pub claim_id: u32,

    pub source_url: String,

    /// Host of `source_url` without a leading `www.`
    pub source_domain: String,

    pub published_date: Option<NaiveDate>,

    /// Extracted passage, bounded length
    pub snippet_text: String,

    /// Embedding similarity to the claim, in [0, 1]
    pub relevance_score: f32,

    /// Source-trust prior, in [0, 1]
    pub credibility_score: f32,

    /// Unset until the verifier runs
    pub nli_label: Option<NliLabel>,

    /// Classifier confidence for `nli_label`, in [0, 1]
    pub nli_score: f32,
}

impl EvidenceSnippet {
    pub fn new(claim_id: u32, source_url: impl Into<String>, snippet_text: impl Into<String>) -> Self {
        let source_url = source_url.into();
        let source_domain = domain_of(&source_url).unwrap_or_default();
        Self {
            claim_id,
            source_url,
            source_domain,
            published_date: None,
            snippet_text: snippet_text.into(),
            relevance_score: 0.0,
            credibility_score: 0.0,
            nli_label: None,
            nli_score: 0.0,
        }
    }

    pub fn with_published_date(mut self, date: Option<NaiveDate>) -> Self {
        self.published_date = date;
        self
    }

    pub fn with_scores(mut self, relevance: f32, credibility: f32) -> Self {
        self.relevance_score = relevance;
        self.credibility_score = credibility;
        self
    }

    pub fn with_nli(mut self, label: NliLabel, score: f32) -> Self {
        self.nli_label = Some(label);
        self.nli_score = score;
        self
    }

    /// Vote weight used by the verifier's aggregate.
    pub fn weight(&self) -> f32 {
        self.relevance_score * self.credibility_score
    }
}

/// Extract the lowercase host of a URL, without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
