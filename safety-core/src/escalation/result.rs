//! Classification result: the canonical, normalized verdict for one message

use serde::{Deserialize, Serialize};

use super::tier::RiskTier;

/// Category used when the classifier gives none.
pub const DEFAULT_CATEGORY: &str = "general";

/// Confidence used when the classifier's value is missing or out of range.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Normalized classification of a single message.
///
/// Only ever produced by [`ResultNormalizer`](super::normalizer::ResultNormalizer)
/// (plus the orchestrator's call-site rules), so the tier/escalation
/// invariants hold for every value handed to callers:
/// - `tier == None` ⇒ `!should_escalate`
/// - `tier >= ElevatedRisk` ⇒ `should_escalate`
/// - `suggested_response.is_some()` ⇒ `tier == CriticalRisk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub tier: RiskTier,
    pub category: String,
    pub reason: String,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    pub should_escalate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_response: Option<String>,
}

impl ClassificationResult {
    /// Whether this result must produce an escalation record.
    pub fn qualifies_for_incident(&self) -> bool {
        self.tier.mandates_escalation() && self.should_escalate
    }

    /// Check the post-normalization invariants.
    pub fn is_consistent(&self) -> bool {
        let tier_ok = match self.tier {
            RiskTier::None => !self.should_escalate,
            RiskTier::MonitorOnly => true,
            RiskTier::ElevatedRisk | RiskTier::CriticalRisk => self.should_escalate,
        };
        let response_ok = self.suggested_response.is_none() || self.tier.is_critical();
        tier_ok && response_ok && (0.0..=1.0).contains(&self.confidence)
    }
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self {
            tier: RiskTier::None,
            category: DEFAULT_CATEGORY.to_string(),
            reason: String::new(),
            confidence: DEFAULT_CONFIDENCE,
            should_escalate: false,
            suggested_response: None,
        }
    }
}
