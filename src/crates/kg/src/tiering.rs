//! Claim confidence tiering.
//!
//! A claim's tier is derived from its effective confidence and the strength
//! of its primary evidence. When effective primary evidence falls below the
//! threshold, confidence is capped at the secondary ceiling.

use serde::{Deserialize, Serialize};

/// Primary-evidence threshold below which confidence is capped.
pub const PRIMARY_EVIDENCE_THRESHOLD: f64 = 0.5;

/// Confidence ceiling for claims backed only by secondary evidence.
pub const SECONDARY_CONFIDENCE_CAP: f64 = 0.7;

/// Tier boundaries on effective confidence.
const SUPPORTED_MIN: f64 = 0.6;
const AUDITED_MIN: f64 = 0.85;

/// The three claim tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    Provisional,
    Supported,
    Audited,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Provisional => "Provisional",
            ConfidenceTier::Supported => "Supported",
            ConfidenceTier::Audited => "Audited",
        }
    }
}

/// Derived tiering for a claim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaimTiering {
    pub effective_confidence: f64,
    pub p_error: f64,
    pub confidence_tier: ConfidenceTier,
    /// True when the secondary-evidence cap lowered the stated confidence.
    pub capped: bool,
}

/// Compute the tiering for a claim.
///
/// `confidence` is the stated confidence in [0, 1];
/// `effective_primary_evidence` measures primary-source backing in [0, 1].
/// An audited claim additionally requires an audit to have happened.
pub fn tier_claim(
    confidence: f64,
    effective_primary_evidence: f64,
    audited: bool,
) -> ClaimTiering {
    let confidence = confidence.clamp(0.0, 1.0);

    let (effective, capped) = if effective_primary_evidence < PRIMARY_EVIDENCE_THRESHOLD {
        let eff = confidence.min(SECONDARY_CONFIDENCE_CAP);
        (eff, eff < confidence)
    } else {
        (confidence, false)
    };

    let tier = if audited && effective >= AUDITED_MIN {
        ConfidenceTier::Audited
    } else if effective >= SUPPORTED_MIN {
        ConfidenceTier::Supported
    } else {
        ConfidenceTier::Provisional
    };

    ClaimTiering {
        effective_confidence: effective,
        p_error: 1.0 - effective,
        confidence_tier: tier,
        capped,
    }
}
