//! Evidence retrieval: search, snippet selection, scoring and ranking.
//!
//! Retrieval for one claim is sequential: each query is issued, its new
//! results are turned into scored snippets, and the loop stops early once
//! enough strong sources are in hand. Candidates are then ranked by
//! relevance blended with recency and capped.

use chrono::{NaiveDate, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::CacheLayer;
use super::credibility::CredibilityTable;
use super::ingest::PageLoader;
use super::retry::RetryPolicy;
use super::sanitize::{split_sentences, truncate_chars};
use crate::error::{ProviderError, ProviderResult, RetrievalError};
use crate::traits::cache::CacheKind;
use crate::traits::embedder::{cosine_similarity, Embedder};
use crate::traits::searcher::{SearchQuery, SearchResult, WebSearcher};
use crate::types::claim::{clamp_unit, Claim};
use crate::types::config::{ModeConfig, PipelineConfig};
use crate::types::evidence::EvidenceSnippet;
use crate::types::request::Mode;

const RELEVANCE_WEIGHT: f32 = 0.8;
const RECENCY_WEIGHT: f32 = 0.2;
const PASSAGE_SENTENCES: usize = 3;

/// Stage 3: find and rank evidence for one claim.
pub struct EvidenceRetriever {
    searcher: Arc<dyn WebSearcher>,
    embedder: Arc<dyn Embedder>,
    pages: PageLoader,
    cache: CacheLayer,
    credibility: CredibilityTable,
    retry: RetryPolicy,
    config: Arc<PipelineConfig>,
}

impl EvidenceRetriever {
    pub fn new(
        searcher: Arc<dyn WebSearcher>,
        embedder: Arc<dyn Embedder>,
        pages: PageLoader,
        cache: CacheLayer,
        retry: RetryPolicy,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            searcher,
            embedder,
            pages,
            cache,
            credibility: CredibilityTable::from_config(&config.credibility),
            retry,
            config,
        }
    }

    /// Ranked evidence for `claim`, at most the mode's evidence cap.
    pub async fn retrieve(
        &self,
        claim: &Claim,
        mode: Mode,
    ) -> Result<Vec<EvidenceSnippet>, RetrievalError> {
        match tokio::time::timeout(
            self.config.timeouts.retrieve(),
            self.retrieve_inner(claim, self.config.mode(mode)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(claim_id = claim.id, "Retrieval timed out");
                Err(RetrievalError::SearchProviderUnavailable(ProviderError::Timeout))
            }
        }
    }

    async fn retrieve_inner(
        &self,
        claim: &Claim,
        mode: &ModeConfig,
    ) -> Result<Vec<EvidenceSnippet>, RetrievalError> {
        let queries = self.formulate_queries(&claim.text, mode);
        let mut candidates: IndexMap<String, EvidenceSnippet> = IndexMap::new();
        let mut last_error = None;
        let mut answered = 0;

        for (query, kind) in &queries {
            let results = match self.search(query, *kind).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(claim_id = claim.id, query = %query.text, error = %e, "Search query failed");
                    last_error = Some(e);
                    continue;
                }
            };
            answered += 1;

            let fresh: Vec<SearchResult> = results
                .into_iter()
                .filter(|r| !candidates.contains_key(r.url.as_str()))
                .collect();
            for snippet in self.build_snippets(claim, fresh, mode).await {
                candidates.entry(snippet.source_url.clone()).or_insert(snippet);
            }

            if self.enough_strong_sources(candidates.values()) {
                debug!(
                    claim_id = claim.id,
                    candidates = candidates.len(),
                    "Early stop: enough strong sources"
                );
                break;
            }
        }

        if answered == 0 {
            if let Some(e) = last_error {
                return Err(RetrievalError::SearchProviderUnavailable(e));
            }
        }
        if candidates.is_empty() {
            return Err(RetrievalError::NoResultsFound);
        }

        let ranked = rank(
            candidates.into_values().collect(),
            Utc::now().date_naive(),
            self.config.recency_years,
            mode.evidence_cap,
        );
        info!(claim_id = claim.id, evidence = ranked.len(), "Evidence retrieved");
        Ok(ranked)
    }

    /// Date-bounded query, unbounded query, and in deep mode a query
    /// restricted to trusted domains. Truncated to the query budget.
    fn formulate_queries(&self, claim_text: &str, mode: &ModeConfig) -> Vec<(SearchQuery, CacheKind)> {
        let base = SearchQuery::new(claim_text, mode.search_results);
        let mut queries = Vec::with_capacity(3);

        if let Some(since) = recency_cutoff(Utc::now().date_naive(), self.config.recency_years) {
            queries.push((base.clone().published_after(since), CacheKind::QuerySearch));
        }
        queries.push((base.clone(), CacheKind::QuerySearch));

        if mode.fetch_full_pages {
            let trusted = self
                .credibility
                .trusted_domains(self.config.early_stop.min_credibility);
            if !trusted.is_empty() {
                queries.push((base.with_domains(trusted), CacheKind::DomainSearch));
            }
        }

        queries.truncate(mode.query_budget);
        queries
    }

    async fn search(&self, query: &SearchQuery, kind: CacheKind) -> ProviderResult<Vec<SearchResult>> {
        let discriminator = query.cache_discriminator();
        if let Some(results) = self.cache.get::<Vec<SearchResult>>(kind, &discriminator).await {
            return Ok(results);
        }

        let results = self
            .retry
            .run("search", || self.searcher.search(query))
            .await?;
        self.cache.put(kind, &discriminator, &results).await;
        Ok(results)
    }

    async fn build_snippets(
        &self,
        claim: &Claim,
        results: Vec<SearchResult>,
        mode: &ModeConfig,
    ) -> Vec<EvidenceSnippet> {
        let mut snippets = Vec::with_capacity(results.len());
        for result in results {
            if let Some(snippet) = self.snippet_for(claim, result, mode).await {
                snippets.push(snippet);
            }
        }
        if snippets.is_empty() {
            return snippets;
        }

        let relevance = self.relevance(&claim.text, &snippets).await;
        for (snippet, relevance) in snippets.iter_mut().zip(relevance) {
            let credibility = self.credibility.score(&snippet.source_domain);
            snippet.relevance_score = relevance;
            snippet.credibility_score = credibility;
        }
        snippets
    }

    async fn snippet_for(
        &self,
        claim: &Claim,
        result: SearchResult,
        mode: &ModeConfig,
    ) -> Option<EvidenceSnippet> {
        let url = result.url.to_string();
        let mut published = result.published_date;

        let page_passage = if mode.fetch_full_pages {
            match self.pages.load(&url).await {
                Ok(page) => {
                    published = published.or(page.published_date);
                    select_passage(&page.text, &claim.text, self.config.max_snippet_chars)
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Evidence page fetch failed, using search snippet");
                    None
                }
            }
        } else {
            None
        };

        let text = page_passage
            .or(result.snippet)
            .or(result.title)
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())?;
        let text = truncate_chars(&text, self.config.max_snippet_chars).to_string();

        Some(EvidenceSnippet::new(claim.id, url, text).with_published_date(published))
    }

    /// Embedding similarity per snippet, or term overlap if embeddings fail.
    async fn relevance(&self, claim_text: &str, snippets: &[EvidenceSnippet]) -> Vec<f32> {
        let mut texts: Vec<&str> = Vec::with_capacity(snippets.len() + 1);
        texts.push(claim_text);
        texts.extend(snippets.iter().map(|s| s.snippet_text.as_str()));

        match self.embeddings(&texts).await {
            Ok(vectors) => {
                let (claim_vector, rest) = vectors.split_at(1);
                rest.iter()
                    .map(|v| clamp_unit(cosine_similarity(&claim_vector[0], v)))
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed, falling back to term overlap");
                snippets
                    .iter()
                    .map(|s| term_overlap(claim_text, &s.snippet_text))
                    .collect()
            }
        }
    }

    /// Cache-backed embeddings. Misses are embedded in one batch.
    async fn embeddings(&self, texts: &[&str]) -> ProviderResult<Vec<Vec<f32>>> {
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let cached = self.cache.get::<Vec<f32>>(CacheKind::Embedding, text).await;
            if cached.is_none() {
                misses.push(i);
            }
            vectors.push(cached);
        }

        if !misses.is_empty() {
            let batch: Vec<&str> = misses.iter().map(|i| texts[*i]).collect();
            let embedded = self
                .retry
                .run("embed", || self.embedder.embed_batch(&batch))
                .await?;
            if embedded.len() != batch.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            for (i, vector) in misses.into_iter().zip(embedded) {
                self.cache.put(CacheKind::Embedding, texts[i], &vector).await;
                vectors[i] = Some(vector);
            }
        }

        Ok(vectors.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn enough_strong_sources<'a>(&self, candidates: impl Iterator<Item = &'a EvidenceSnippet>) -> bool {
        let rule = &self.config.early_stop;
        candidates
            .filter(|s| s.relevance_score >= rule.min_relevance && s.credibility_score >= rule.min_credibility)
            .count()
            >= rule.min_sources
    }
}

fn recency_cutoff(today: NaiveDate, years: u32) -> Option<NaiveDate> {
    today.checked_sub_days(chrono::Days::new(u64::from(years) * 365))
}

/// Recency prior: unknown 0.5, linear from 1.0 to 0.5 inside the window,
/// 0.25 beyond it.
pub fn recency_score(published: Option<NaiveDate>, today: NaiveDate, years: u32) -> f32 {
    let Some(date) = published else {
        return 0.5;
    };
    let age_days = (today - date).num_days();
    let window_days = i64::from(years.max(1)) * 365;

    if age_days <= 0 {
        1.0
    } else if age_days <= window_days {
        1.0 - 0.5 * (age_days as f32 / window_days as f32)
    } else {
        0.25
    }
}

/// Sort by blended relevance and recency (stable), then cap.
pub fn rank(
    mut candidates: Vec<EvidenceSnippet>,
    today: NaiveDate,
    recency_years: u32,
    cap: usize,
) -> Vec<EvidenceSnippet> {
    let score = |s: &EvidenceSnippet| {
        RELEVANCE_WEIGHT * s.relevance_score
            + RECENCY_WEIGHT * recency_score(s.published_date, today, recency_years)
    };
    candidates.sort_by(|a, b| score(b).total_cmp(&score(a)));
    candidates.truncate(cap);
    candidates
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Share of the claim's terms that appear in `text`.
pub fn term_overlap(claim: &str, text: &str) -> f32 {
    let claim_terms = terms(claim);
    if claim_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    claim_terms.intersection(&text_terms).count() as f32 / claim_terms.len() as f32
}

/// Window of up to three sentences sharing the most terms with the claim.
///
/// Falls back to the opening window when nothing overlaps.
pub fn select_passage(page_text: &str, claim: &str, max_chars: usize) -> Option<String> {
    let sentences = split_sentences(page_text);
    if sentences.is_empty() {
        return None;
    }

    let claim_terms = terms(claim);
    let window = PASSAGE_SENTENCES.min(sentences.len());
    let mut best = (0, 0);
    for start in 0..=sentences.len() - window {
        let passage_terms = terms(&sentences[start..start + window].join(" "));
        let hits = claim_terms.intersection(&passage_terms).count();
        if hits > best.1 {
            best = (start, hits);
        }
    }

    let passage = sentences[best.0..best.0 + window].join(" ");
    Some(truncate_chars(&passage, max_chars).to_string())
}
