//! Cheap verification before expensive reasoning: regex NER and term
//! statistics decide whether the extractor needs a model call at all.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Confidence threshold above which cheap extraction is considered enough.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Inputs shorter than this always go to the model (needs context).
pub const SHORT_TEXT_THRESHOLD: usize = 50;

/// Inputs longer than this always go to the model (needs chunking).
pub const LONG_TEXT_THRESHOLD: usize = 10_000;

/// Pattern-based NER results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NerResults {
    pub dates: Vec<String>,
    pub numbers: Vec<String>,
    pub urls: Vec<String>,
    pub emails: Vec<String>,
    pub proper_nouns: Vec<String>,
}

impl NerResults {
    pub fn entity_count(&self) -> usize {
        self.dates.len()
            + self.numbers.len()
            + self.urls.len()
            + self.emails.len()
            + self.proper_nouns.len()
    }
}

/// Term-frequency statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TermStats {
    pub frequent_terms: Vec<(String, usize)>,
    pub total_words: usize,
    pub unique_words: usize,
}

/// Combined cheap-extraction result.
#[derive(Debug, Clone, Serialize)]
pub struct CheapExtraction {
    pub ner: NerResults,
    pub statistics: TermStats,
    pub confidence: f64,
}

fn regexes() -> &'static [(usize, Regex)] {
    static REGEXES: OnceLock<Vec<(usize, Regex)>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            r"\d{4}-\d{2}-\d{2}",
            r"\d{1,2}/\d{1,2}/\d{4}",
            r"\d+\.?\d*",
            r"https?://\S+",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b",
        ]
        .iter()
        .enumerate()
        .map(|(i, p)| (i, Regex::new(p).expect("hard-coded regex")))
        .collect()
    })
}

/// Simple pattern NER: dates, numbers, URLs, emails, and capitalized
/// multi-word phrases as candidate proper nouns.
pub fn simple_ner(text: &str) -> NerResults {
    let mut results = NerResults::default();
    for (index, re) in regexes() {
        let matches: Vec<String> = re.find_iter(text).map(|m| m.as_str().to_string()).collect();
        match index {
            0 | 1 => results.dates.extend(matches),
            2 => results.numbers.extend(matches),
            3 => results.urls.extend(matches),
            4 => results.emails.extend(matches),
            5 => results.proper_nouns.extend(matches),
            _ => {}
        }
    }
    results
}

/// Frequent-term statistics over words longer than three characters.
pub fn term_statistics(text: &str, min_frequency: usize) -> TermStats {
    let words: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();

    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in &words {
        if word.len() > 3 {
            *freq.entry(word.clone()).or_insert(0) += 1;
        }
    }
    let unique_words = freq.len();

    let mut frequent: Vec<(String, usize)> = freq
        .into_iter()
        .filter(|(_, count)| *count >= min_frequency)
        .collect();
    frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    frequent.truncate(20);

    TermStats {
        frequent_terms: frequent,
        total_words: words.len(),
        unique_words,
    }
}

/// Decide whether model extraction is needed.
///
/// Returns `(use_model, confidence, cheap_results)`. Confidence below the
/// threshold, or very short or very long inputs, force the model path.
pub fn should_use_model(text: &str) -> (bool, f64, CheapExtraction) {
    let ner = simple_ner(text);
    let statistics = term_statistics(text, 2);

    let confidence = ((ner.entity_count() as f64) * 0.1
        + (statistics.frequent_terms.len() as f64) * 0.05)
        .min(1.0);

    let use_model = confidence < CONFIDENCE_THRESHOLD
        || text.len() < SHORT_TEXT_THRESHOLD
        || text.len() > LONG_TEXT_THRESHOLD;

    (
        use_model,
        confidence,
        CheapExtraction {
            ner,
            statistics,
            confidence,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ner_finds_patterns() {
        let text = "Alan Turing published on 1950-10-01, see https://example.org/paper \
                    or mail turing@cam.ac.uk about 42 machines";
        let ner = simple_ner(text);
        assert!(ner.proper_nouns.iter().any(|n| n.contains("Alan Turing")));
        assert_eq!(ner.dates, vec!["1950-10-01"]);
        assert!(ner.urls[0].starts_with("https://"));
        assert_eq!(ner.emails.len(), 1);
        assert!(!ner.numbers.is_empty());
    }

    #[test]
    fn test_term_statistics() {
        let text = "graph theory graph theory graph algorithms and short a b c";
        let stats = term_statistics(text, 2);
        assert_eq!(stats.frequent_terms[0].0, "graph");
        assert_eq!(stats.frequent_terms[0].1, 3);
        assert!(stats.total_words > 5);
    }

    #[test]
    fn test_short_input_forces_model() {
        let (use_model, _, _) = should_use_model("topic=x");
        assert!(use_model);
    }

    #[test]
    fn test_long_input_forces_model() {
        let rich = "Alan Turing wrote https://a.org on 2020-01-01 emailing a@b.org. ";
        let long_text = rich.repeat(400); // > 10k chars, high confidence
        assert!(long_text.len() > LONG_TEXT_THRESHOLD);
        let (use_model, confidence, _) = should_use_model(&long_text);
        assert!(confidence >= CONFIDENCE_THRESHOLD);
        assert!(use_model);
    }

    #[test]
    fn test_entity_rich_medium_input_skips_model() {
        let text = "Alan Turing and John Von Neumann met at Princeton University in 1946. \
                    See https://example.org/a https://example.org/b https://example.org/c \
                    dated 1946-01-01 and 1946-02-01 with 100 200 300 400 figures. \
                    Claude Shannon and Kurt Godel corresponded about theory theory theory \
                    machines machines machines computation computation computation.";
        let (use_model, confidence, cheap) = should_use_model(text);
        assert!(confidence >= CONFIDENCE_THRESHOLD, "confidence={}", confidence);
        assert!(!use_model);
        assert!(cheap.ner.entity_count() > 5);
    }

    #[test]
    fn test_low_signal_input_uses_model() {
        let text = "please tell me something interesting about things and stuff okay then";
        let (use_model, confidence, _) = should_use_model(text);
        assert!(confidence < CONFIDENCE_THRESHOLD);
        assert!(use_model);
    }
}
