//! Result Normalizer: deterministic safety invariants over raw classifier output
//!
//! The classifier is probabilistic; this module is not. Whatever JSON comes
//! back, the steps below run in a fixed order and the output always satisfies
//! the tier/escalation invariants of [`ClassificationResult`].
//!
//! ```text
//! raw text ── extract {…} ── parse ──┐
//!                                    ▼
//! 1. tier        → integer in [0,3]        (else 0)
//! 2. category    → non-empty string        (else "general")
//! 3. confidence  → real in [0,1]           (else 0.5)
//! 4. escalation  → fill if omitted, then tier overrides:
//!                    tier ≥ 2 ⇒ true, tier 0 ⇒ false
//! 5. suggestedResponse kept only at tier 3
//! ```
//!
//! Overrides run after coercion and after the default-fill step, otherwise a
//! missing field could produce an inconsistent (tier, shouldEscalate) pair.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::result::{ClassificationResult, DEFAULT_CATEGORY, DEFAULT_CONFIDENCE};
use super::tier::RiskTier;
use crate::error::MalformedResponseError;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("FENCED_JSON regex should compile")
});

/// A correction the normalizer applied to the raw classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    /// Tier missing, non-numeric, or out of range.
    TierDefaulted { raw: Option<String> },
    /// Category missing or blank.
    CategoryDefaulted,
    /// Confidence missing, non-numeric, or outside [0,1].
    ConfidenceDefaulted { raw: Option<String> },
    /// `shouldEscalate` omitted; derived from the tier.
    EscalationFilled { value: bool },
    /// Tier 2/3 reported `shouldEscalate: false`.
    EscalationForcedOn { tier: RiskTier },
    /// Tier 0 reported `shouldEscalate: true`.
    EscalationForcedOff,
    /// A suggested response arrived for a tier below CriticalRisk.
    SuggestedResponseDropped { tier: RiskTier },
}

impl Adjustment {
    /// Whether this adjustment contradicted an explicit classifier decision.
    pub fn is_override(&self) -> bool {
        matches!(self, Self::EscalationForcedOn { .. } | Self::EscalationForcedOff)
    }
}

/// Normalized result plus the corrections that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub result: ClassificationResult,
    pub adjustments: Vec<Adjustment>,
}

impl Normalized {
    pub fn overrides(&self) -> impl Iterator<Item = &Adjustment> {
        self.adjustments.iter().filter(|a| a.is_override())
    }
}

/// Applies the safety invariants to raw classifier output.
#[derive(Debug, Clone, Default)]
pub struct ResultNormalizer;

impl ResultNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw classifier text and normalize it.
    ///
    /// Any parse failure is a [`MalformedResponseError`]; the caller treats
    /// it as "classification unavailable".
    pub fn normalize(&self, raw: &str) -> Result<Normalized, MalformedResponseError> {
        let json = extract_json_object(raw).ok_or(MalformedResponseError::NoJsonObject)?;
        let value: Value = serde_json::from_str(json)?;
        self.normalize_value(&value)
    }

    /// Normalize an already-parsed JSON value. Must be an object.
    pub fn normalize_value(&self, value: &Value) -> Result<Normalized, MalformedResponseError> {
        let obj = value.as_object().ok_or(MalformedResponseError::NotAnObject {
            found: json_kind(value),
        })?;

        let mut adjustments = Vec::new();

        // 1. tier
        let tier = match obj.get("tier").and_then(coerce_tier) {
            Some(tier) => tier,
            None => {
                adjustments.push(Adjustment::TierDefaulted {
                    raw: obj.get("tier").map(Value::to_string),
                });
                RiskTier::None
            }
        };

        // 2. category
        let category = match obj.get("category").and_then(Value::as_str).map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => {
                adjustments.push(Adjustment::CategoryDefaulted);
                DEFAULT_CATEGORY.to_string()
            }
        };

        // 3. confidence
        let confidence = match obj.get("confidence").and_then(coerce_confidence) {
            Some(c) => c,
            None => {
                adjustments.push(Adjustment::ConfidenceDefaulted {
                    raw: obj.get("confidence").map(Value::to_string),
                });
                DEFAULT_CONFIDENCE
            }
        };

        // 4. shouldEscalate: default-fill first, then tier overrides
        let should_escalate = match obj.get("shouldEscalate").and_then(coerce_bool) {
            None => {
                let value = tier.mandates_escalation();
                adjustments.push(Adjustment::EscalationFilled { value });
                value
            }
            Some(false) if tier.mandates_escalation() => {
                warn!(%tier, "Classifier declined escalation for mandatory tier; overriding");
                adjustments.push(Adjustment::EscalationForcedOn { tier });
                true
            }
            Some(true) if tier == RiskTier::None => {
                warn!("Classifier requested escalation at tier 0; overriding");
                adjustments.push(Adjustment::EscalationForcedOff);
                false
            }
            Some(value) => value,
        };

        // 5. suggestedResponse
        let suggested_response = match obj
            .get("suggestedResponse")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(text) if tier.is_critical() => Some(text.to_string()),
            Some(_) => {
                adjustments.push(Adjustment::SuggestedResponseDropped { tier });
                None
            }
            None => None,
        };

        let reason = obj
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let result = ClassificationResult {
            tier,
            category,
            reason,
            confidence,
            should_escalate,
            suggested_response,
        };
        debug!(
            tier = %result.tier,
            category = %result.category,
            confidence = result.confidence,
            should_escalate = result.should_escalate,
            adjustments = adjustments.len(),
            "Classifier output normalized"
        );

        Ok(Normalized {
            result,
            adjustments,
        })
    }
}

/// Locate the JSON object inside raw model output.
///
/// Accepts bare JSON, a fenced ```json block, or an object surrounded by
/// prose. In prose, the first `{` that opens a complete JSON object wins and
/// anything after that object is ignored, braces included.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(captures) = FENCED_JSON.captures(trimmed) {
        if let Some(m) = captures.get(1) {
            return Some(m.as_str());
        }
    }
    if let Some(object) = first_complete_object(trimmed) {
        return Some(object);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        // Not an object; hand it to the parser so the caller gets a precise error.
        _ if trimmed.starts_with('[') || trimmed.starts_with('"') => Some(trimmed),
        _ => None,
    }
}

/// Slice of the first complete JSON object in `text`, if any.
fn first_complete_object(text: &str) -> Option<&str> {
    text.match_indices('{').find_map(|(start, _)| {
        let candidate = &text[start..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(_))) => Some(&candidate[..stream.byte_offset()]),
            _ => None,
        }
    })
}

fn coerce_tier(value: &Value) -> Option<RiskTier> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    RiskTier::from_level(number.trunc() as i64)
}

fn coerce_confidence(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (number.is_finite() && (0.0..=1.0).contains(&number)).then_some(number)
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
