//! Domain credibility priors.

use std::collections::HashMap;

use crate::types::claim::clamp_unit;
use crate::types::config::CredibilityConfig;

/// Lookup table built from [`CredibilityConfig`].
///
/// Resolution order: exact domain or nearest listed parent domain, then the
/// first matching suffix tier, then the default score.
#[derive(Debug, Clone)]
pub struct CredibilityTable {
    domains: HashMap<String, f32>,
    suffix_tiers: Vec<(String, f32)>,
    default_score: f32,
}

impl CredibilityTable {
    pub fn from_config(config: &CredibilityConfig) -> Self {
        Self {
            domains: config
                .domains
                .iter()
                .map(|(domain, score)| (normalize(domain), clamp_unit(*score)))
                .collect(),
            suffix_tiers: config
                .suffix_tiers
                .iter()
                .map(|(suffix, score)| (suffix.to_lowercase(), clamp_unit(*score)))
                .collect(),
            default_score: clamp_unit(config.default_score),
        }
    }

    /// Credibility prior for a domain, in [0, 1].
    pub fn score(&self, domain: &str) -> f32 {
        let domain = normalize(domain);

        let mut candidate = domain.as_str();
        loop {
            if let Some(score) = self.domains.get(candidate) {
                return *score;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => break,
            }
        }

        self.suffix_tiers
            .iter()
            .find(|(suffix, _)| domain.ends_with(suffix.as_str()))
            .map(|(_, score)| *score)
            .unwrap_or(self.default_score)
    }

    /// Listed domains scoring at least `min`, sorted for stable cache keys.
    pub fn trusted_domains(&self, min: f32) -> Vec<String> {
        let mut domains: Vec<String> = self
            .domains
            .iter()
            .filter(|(_, score)| **score >= min)
            .map(|(domain, _)| domain.clone())
            .collect();
        domains.sort();
        domains
    }
}

fn normalize(domain: &str) -> String {
    let lower = domain.trim().trim_end_matches('.').to_lowercase();
    lower.strip_prefix("www.").map(str::to_string).unwrap_or(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CredibilityTable {
        CredibilityTable::from_config(
            &CredibilityConfig::default()
                .with_tier(&["reuters.com", "apnews.com"], 0.9)
                .with_domain("Example.org", 0.3),
        )
    }

    #[test]
    fn test_exact_and_subdomain_match() {
        let table = table();
        assert_eq!(table.score("reuters.com"), 0.9);
        assert_eq!(table.score("www.reuters.com"), 0.9);
        assert_eq!(table.score("uk.reuters.com"), 0.9);
        assert_eq!(table.score("example.org"), 0.3);
    }

    #[test]
    fn test_suffix_tier_and_default() {
        let table = table();
        assert_eq!(table.score("nasa.gov"), 1.0);
        assert_eq!(table.score("cs.stanford.edu"), 1.0);
        assert_eq!(table.score("random-blog.net"), 0.6);
    }

    #[test]
    fn test_scores_are_clamped() {
        let table = CredibilityTable::from_config(&CredibilityConfig::default().with_domain("x.com", 4.0));
        assert_eq!(table.score("x.com"), 1.0);
    }

    #[test]
    fn test_trusted_domains_sorted() {
        assert_eq!(table().trusted_domains(0.8), vec!["apnews.com", "reuters.com"]);
    }
}
