//! Risk tiers: the ordinal severity ladder a message is classified into

use serde::{Deserialize, Serialize};

/// Severity tier assigned to a user message.
///
/// Ordered: `None < MonitorOnly < ElevatedRisk < CriticalRisk`. Serialized as
/// the bare integer level (0–3), which is also the classifier wire format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum RiskTier {
    /// Nothing concerning.
    #[default]
    None = 0,
    /// Worth watching; never records an incident on its own.
    MonitorOnly = 1,
    /// Requires human follow-up.
    ElevatedRisk = 2,
    /// Immediate crisis handling; puts the conversation in safety mode.
    CriticalRisk = 3,
}

impl RiskTier {
    /// Tiers that carry admin-authored conditions, lowest first.
    pub const CONDITION_TIERS: [RiskTier; 3] = [
        RiskTier::MonitorOnly,
        RiskTier::ElevatedRisk,
        RiskTier::CriticalRisk,
    ];

    /// Map an integer level to a tier. Out-of-range levels yield `None`
    /// (the Rust `Option`, not the tier).
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(Self::None),
            1 => Some(Self::MonitorOnly),
            2 => Some(Self::ElevatedRisk),
            3 => Some(Self::CriticalRisk),
            _ => None,
        }
    }

    /// Integer level of this tier.
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Tier 2 and above must always escalate.
    pub fn mandates_escalation(self) -> bool {
        self >= Self::ElevatedRisk
    }

    pub fn is_critical(self) -> bool {
        self == Self::CriticalRisk
    }

    /// Heading used when rendering this tier's conditions into a prompt.
    pub fn heading(self) -> &'static str {
        match self {
            Self::None => "Tier 0: No Concern",
            Self::MonitorOnly => "Tier 1: Monitor Only",
            Self::ElevatedRisk => "Tier 2: Elevated Risk",
            Self::CriticalRisk => "Tier 3: Critical Risk",
        }
    }

    /// One-line guidance for the classifier describing this tier.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::None => "ordinary performance, training, or motivation talk with no risk indicators",
            Self::MonitorOnly => {
                "mild or ambiguous distress worth noting for the coach; no immediate action"
            }
            Self::ElevatedRisk => {
                "significant distress or risk indicators that need human or clinical follow-up"
            }
            Self::CriticalRisk => {
                "imminent risk of harm to self or others; crisis resources must be offered now"
            }
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::MonitorOnly => write!(f, "monitor_only"),
            Self::ElevatedRisk => write!(f, "elevated_risk"),
            Self::CriticalRisk => write!(f, "critical_risk"),
        }
    }
}

impl From<RiskTier> for u8 {
    fn from(tier: RiskTier) -> Self {
        tier.level()
    }
}

/// Level outside `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("risk tier level {0} is out of range 0-3")]
pub struct InvalidTier(pub u8);

impl TryFrom<u8> for RiskTier {
    type Error = InvalidTier;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(i64::from(level)).ok_or(InvalidTier(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(RiskTier::None < RiskTier::MonitorOnly);
        assert!(RiskTier::MonitorOnly < RiskTier::ElevatedRisk);
        assert!(RiskTier::ElevatedRisk < RiskTier::CriticalRisk);
    }

    #[test]
    fn test_mandates_escalation() {
        assert!(!RiskTier::None.mandates_escalation());
        assert!(!RiskTier::MonitorOnly.mandates_escalation());
        assert!(RiskTier::ElevatedRisk.mandates_escalation());
        assert!(RiskTier::CriticalRisk.mandates_escalation());
    }

    #[test]
    fn test_from_level_rejects_out_of_range() {
        assert_eq!(RiskTier::from_level(3), Some(RiskTier::CriticalRisk));
        assert_eq!(RiskTier::from_level(4), None);
        assert_eq!(RiskTier::from_level(-1), None);
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&RiskTier::ElevatedRisk).unwrap();
        assert_eq!(json, "2");
        let tier: RiskTier = serde_json::from_str("3").unwrap();
        assert_eq!(tier, RiskTier::CriticalRisk);
        assert!(serde_json::from_str::<RiskTier>("7").is_err());
    }
}
