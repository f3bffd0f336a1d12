//! Paywall detection for fetched pages.
//!
//! Flags a page as paywalled when at least two indicators match or the
//! aggregate confidence reaches 0.6; each matched indicator contributes 0.3.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::warn;

const INDICATOR_PATTERNS: &[&str] = &[
    // Keywords
    r"subscribe",
    r"subscription",
    r"paywall",
    r"premium",
    r"unlock",
    r"purchase",
    r"buy now",
    r"members only",
    r"sign up",
    // Common paywall services
    r"piano\.io",
    r"metered",
    r"freemium",
    // HTML patterns
    r"class.*paywall",
    r"id.*paywall",
    r"data-paywall",
];

fn indicator_regexes() -> &'static Vec<Regex> {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        INDICATOR_PATTERNS
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("hard-coded regex"))
            .collect()
    })
}

/// Paywall detection result.
#[derive(Debug, Clone, Serialize)]
pub struct PaywallCheck {
    pub is_paywall: bool,
    pub confidence: f64,
    pub indicators: Vec<String>,
}

/// Detect whether page content is behind a paywall.
pub fn detect_paywall(html: &str, url: Option<&str>) -> PaywallCheck {
    if html.is_empty() {
        return PaywallCheck {
            is_paywall: false,
            confidence: 0.0,
            indicators: Vec::new(),
        };
    }

    let mut indicators = Vec::new();
    for (pattern, re) in INDICATOR_PATTERNS.iter().zip(indicator_regexes()) {
        if re.is_match(html) || url.map(|u| re.is_match(u)).unwrap_or(false) {
            indicators.push(pattern.to_string());
        }
    }

    let confidence = (indicators.len() as f64 * 0.3).min(1.0);
    let is_paywall = indicators.len() >= 2 || confidence >= 0.6;

    if is_paywall {
        warn!(
            indicators = indicators.len(),
            confidence, "Paywall detected"
        );
    }

    PaywallCheck {
        is_paywall,
        confidence,
        indicators,
    }
}
