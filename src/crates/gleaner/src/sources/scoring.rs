//! Source quality, cost, and priority scoring.
//!
//! Priority = 0.7·quality − 0.3·cost, with a +0.1 bonus for free sources:
//! high-confidence free sources come first, low-confidence costly ones last.

use crate::sources::providers::SourceCandidate;
use chrono::{Datelike, Utc};
use serde::Serialize;

/// Weights for the quality components.
const W_PROVENANCE: f64 = 0.3;
const W_PEER_REVIEW: f64 = 0.3;
const W_RECENCY: f64 = 0.2;
const W_CITATIONS: f64 = 0.2;

/// Quality score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct QualityComponents {
    pub provenance: f64,
    pub peer_review: f64,
    pub recency: f64,
    pub citations: f64,
}

/// Hosts that serve content for free.
const FREE_HOST_FRAGMENTS: &[&str] = &[
    "openstax.org",
    "khanacademy.org",
    "ocw.mit.edu",
    "libretexts.org",
    "wikipedia.org",
    "arxiv.org",
    "openalex.org",
    ".gov",
    ".edu",
];

/// Compute the quality score for a source from provenance, peer review,
/// recency, and citation counts when present.
pub fn quality_score(source: &SourceCandidate) -> (f64, QualityComponents) {
    let provenance = if source.doi.is_some() {
        1.0
    } else if source.url.is_some() && (!source.authors.is_empty() || source.year.is_some()) {
        0.7
    } else if source.url.is_some() {
        0.5
    } else {
        0.3
    };

    let type_lower = source.source_type.to_lowercase();
    let peer_review = if type_lower.contains("peer_reviewed") || type_lower.contains("journal") {
        1.0
    } else if type_lower.contains("conference") {
        0.8
    } else if type_lower.contains("textbook") || type_lower.contains("course") {
        0.7
    } else if type_lower.contains("preprint") {
        0.6
    } else if type_lower.contains("encyclopedia") {
        0.5
    } else {
        0.5
    };

    let recency = match source.year {
        Some(year) => {
            let age = (Utc::now().year() - year).max(0);
            match age {
                0..=2 => 1.0,
                3..=5 => 0.8,
                6..=10 => 0.6,
                11..=20 => 0.4,
                _ => 0.3,
            }
        }
        None => 0.5,
    };

    let citations = match source.citation_count {
        Some(0) => 0.3,
        Some(count) if count >= 100 => 1.0,
        Some(count) => 0.3 + (count as f64 / 100.0) * 0.7,
        None => 0.5,
    };

    let components = QualityComponents {
        provenance,
        peer_review,
        recency,
        citations,
    };
    let score = W_PROVENANCE * provenance
        + W_PEER_REVIEW * peer_review
        + W_RECENCY * recency
        + W_CITATIONS * citations;
    (score, components)
}

/// Compute the cost score for a source: 0.0 free, 0.8 paywalled/proprietary,
/// 0.3 unknown.
pub fn cost_score(source: &SourceCandidate) -> f64 {
    if let Some(url) = &source.url {
        let url_lower = url.to_lowercase();
        if FREE_HOST_FRAGMENTS.iter().any(|h| url_lower.contains(h)) {
            return 0.0;
        }
        const PAYWALL_HINTS: &[&str] = &["paywall", "subscription", "purchase", "premium"];
        if PAYWALL_HINTS.iter().any(|h| url_lower.contains(h)) {
            return 0.8;
        }
    }

    let type_lower = source.source_type.to_lowercase();
    const FREE_TYPES: &[&str] = &[
        "openstax",
        "khan",
        "ocw",
        "libretexts",
        "encyclopedia",
        "preprint",
        "oer",
        "government",
    ];
    if FREE_TYPES.iter().any(|t| type_lower.contains(t)) {
        return 0.0;
    }
    if type_lower.contains("textbook") || type_lower.contains("course") {
        return 0.2;
    }
    if type_lower.contains("subscription") || type_lower.contains("premium") {
        return 0.5;
    }
    if type_lower.contains("paywall") || type_lower.contains("proprietary") {
        return 0.8;
    }
    0.3
}

/// Priority from quality and cost, boosting free sources.
pub fn priority_score(quality: f64, cost: f64) -> f64 {
    let mut priority = quality * 0.7 - cost * 0.3;
    if cost == 0.0 {
        priority += 0.1;
    }
    priority
}

/// Cost tier name from a cost score.
pub fn cost_tier(cost: f64) -> &'static str {
    if cost == 0.0 {
        "free"
    } else if cost < 0.3 {
        "low"
    } else if cost < 0.6 {
        "medium"
    } else {
        "high"
    }
}

/// Score every source and sort by priority, highest first.
pub fn rank_sources(mut sources: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    for source in &mut sources {
        let (quality, _) = quality_score(source);
        let cost = cost_score(source);
        source.quality_score = quality;
        source.cost_score = cost;
        source.priority_score = priority_score(quality, cost);
        source.cost_tier = cost_tier(cost).to_string();
    }
    sources.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::providers::SourceProvider;

    fn paper(title: &str, doi: Option<&str>, citations: Option<u64>) -> SourceCandidate {
        let mut source =
            SourceCandidate::new(title, SourceProvider::SemanticScholar, "peer_reviewed_journal");
        source.doi = doi.map(String::from);
        source.citation_count = citations;
        source.year = Some(Utc::now().year() - 1);
        source.url = Some("https://doi.org/xyz".to_string());
        source
    }

    #[test]
    fn test_doi_paper_scores_high() {
        let (score, components) = quality_score(&paper("P", Some("10.1/x"), Some(150)));
        assert_eq!(components.provenance, 1.0);
        assert_eq!(components.peer_review, 1.0);
        assert_eq!(components.citations, 1.0);
        assert!(score > 0.9);
    }

    #[test]
    fn test_bare_source_scores_low() {
        let source = SourceCandidate::new("X", SourceProvider::Wikipedia, "unknown");
        let (score, _) = quality_score(&source);
        assert!(score < 0.5);
    }

    #[test]
    fn test_cost_scores() {
        let mut free = SourceCandidate::new("F", SourceProvider::Arxiv, "preprint");
        free.url = Some("https://arxiv.org/abs/1".to_string());
        assert_eq!(cost_score(&free), 0.0);

        let mut paywalled = SourceCandidate::new("P", SourceProvider::SemanticScholar, "paywalled_paper");
        paywalled.url = Some("https://journal.example.com/premium/1".to_string());
        assert_eq!(cost_score(&paywalled), 0.8);

        let unknown = SourceCandidate::new("U", SourceProvider::SemanticScholar, "unknown");
        assert_eq!(cost_score(&unknown), 0.3);
    }

    #[test]
    fn test_priority_formula_and_free_bonus() {
        assert!((priority_score(1.0, 0.0) - 0.8).abs() < 1e-9);
        assert!((priority_score(1.0, 0.8) - 0.46).abs() < 1e-9);
    }

    #[test]
    fn test_all_free_ranking_equals_quality_order() {
        let mut high = paper("high", Some("10.1/h"), Some(200));
        high.url = Some("https://arxiv.org/abs/h".to_string());
        let mut low = SourceCandidate::new("low", SourceProvider::Wikipedia, "encyclopedia");
        low.url = Some("https://en.wikipedia.org/wiki/low".to_string());
        let mut mid = SourceCandidate::new("mid", SourceProvider::Arxiv, "preprint");
        mid.url = Some("https://arxiv.org/abs/m".to_string());
        mid.year = Some(Utc::now().year());

        let ranked = rank_sources(vec![low.clone(), high.clone(), mid.clone()]);
        assert!(ranked.iter().all(|s| s.cost_score == 0.0));

        let by_quality: Vec<f64> = ranked.iter().map(|s| s.quality_score).collect();
        let mut sorted = by_quality.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(by_quality, sorted);
        assert_eq!(ranked[0].title, "high");
    }

    #[test]
    fn test_cost_tiers() {
        assert_eq!(cost_tier(0.0), "free");
        assert_eq!(cost_tier(0.2), "low");
        assert_eq!(cost_tier(0.5), "medium");
        assert_eq!(cost_tier(0.8), "high");
    }
}
