//! Escalation Record: the durable, append-only incident artifact

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::ClassificationResult;
use super::tier::RiskTier;

/// Identifier of a persisted escalation record.
pub type RecordId = String;

/// Whether the user must consent before a human handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStatus {
    /// Critical incidents skip consent.
    NotRequired,
    Pending,
    Granted,
    Declined,
}

impl ConsentStatus {
    /// Initial consent status for a newly recorded tier.
    pub fn initial_for(tier: RiskTier) -> Self {
        if tier.is_critical() {
            Self::NotRequired
        } else {
            Self::Pending
        }
    }
}

/// Progress of the human/clinical handoff. Advanced by downstream workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandoffStatus {
    Pending,
    InProgress,
    Completed,
}

/// Lifecycle of the incident itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Active,
    Resolved,
    Closed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Resolved => write!(f, "resolved"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A persisted escalation incident.
///
/// Created exactly once per qualifying classification; this crate never
/// mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRecord {
    pub id: RecordId,
    pub user_id: String,
    pub conversation_id: String,
    pub tier: RiskTier,
    pub category: String,
    pub trigger_message_id: String,
    /// Verbatim user message.
    pub trigger_content: String,
    pub classification_reason: String,
    pub classification_confidence: f64,
    pub consent_status: ConsentStatus,
    pub handoff_status: HandoffStatus,
    pub coach_notified: bool,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

impl EscalationRecord {
    /// Build a fresh record for a qualifying result.
    pub fn new(
        user_id: &str,
        conversation_id: &str,
        trigger_message_id: &str,
        trigger_content: &str,
        result: &ClassificationResult,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            tier: result.tier,
            category: result.category.clone(),
            trigger_message_id: trigger_message_id.to_string(),
            trigger_content: trigger_content.to_string(),
            classification_reason: result.reason.clone(),
            classification_confidence: result.confidence,
            consent_status: ConsentStatus::initial_for(result.tier),
            handoff_status: HandoffStatus::Pending,
            coach_notified: false,
            status: RecordStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Override the creation time (history fixtures, imports).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
