//! Safety event types published by the escalation pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::{RecordId, RiskTier};

/// Everything downstream workflows may react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SafetyEvent {
    /// A message was classified and normalized.
    ClassificationCompleted {
        conversation_id: String,
        message_id: String,
        tier: RiskTier,
        should_escalate: bool,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// Tier 1 with escalation requested: a coach should be notified, no incident.
    MonitorFlagged {
        user_id: String,
        conversation_id: String,
        category: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// An escalation record was written and the conversation projection updated.
    IncidentRecorded {
        record_id: RecordId,
        user_id: String,
        conversation_id: String,
        tier: RiskTier,
        timestamp: DateTime<Utc>,
    },

    /// Incident recording failed. `record_id` is set when the record exists
    /// but the conversation projection was not updated.
    RecordingFailed {
        conversation_id: String,
        record_id: Option<RecordId>,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The classifier could not produce a result; treated as tier 0.
    ClassificationUnavailable {
        conversation_id: String,
        message_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl SafetyEvent {
    /// Event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ClassificationCompleted { .. } => "classification_completed",
            Self::MonitorFlagged { .. } => "monitor_flagged",
            Self::IncidentRecorded { .. } => "incident_recorded",
            Self::RecordingFailed { .. } => "recording_failed",
            Self::ClassificationUnavailable { .. } => "classification_unavailable",
        }
    }

    /// Conversation this event belongs to
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::ClassificationCompleted {
                conversation_id, ..
            }
            | Self::MonitorFlagged {
                conversation_id, ..
            }
            | Self::IncidentRecorded {
                conversation_id, ..
            }
            | Self::RecordingFailed {
                conversation_id, ..
            }
            | Self::ClassificationUnavailable {
                conversation_id, ..
            } => conversation_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ClassificationCompleted { timestamp, .. }
            | Self::MonitorFlagged { timestamp, .. }
            | Self::IncidentRecorded { timestamp, .. }
            | Self::RecordingFailed { timestamp, .. }
            | Self::ClassificationUnavailable { timestamp, .. } => *timestamp,
        }
    }
}
