//! Core types read and written by the safety pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::{EscalationRecord, RecordId, RecordStatus, RiskTier};

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Coach"),
        }
    }
}

/// A prior conversation turn fed to the classifier as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A persisted chat turn handed to the safety pipeline.
///
/// The chat handler builds this after the user and assistant messages are
/// durably stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub user_id: String,
    pub conversation_id: String,
    pub message_id: String,
    /// The user message being classified, verbatim.
    pub message: String,
    /// Earlier turns, oldest first.
    #[serde(default)]
    pub recent_messages: Vec<ConversationMessage>,
    /// Coach-facing notes about the user's mental state.
    #[serde(default)]
    pub mental_notes: Vec<String>,
}

impl ChatTurn {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            message: message.into(),
            recent_messages: Vec::new(),
            mental_notes: Vec::new(),
        }
    }

    pub fn with_recent_messages(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.recent_messages = messages;
        self
    }

    pub fn with_mental_notes(mut self, notes: Vec<String>) -> Self {
        self.mental_notes = notes;
        self
    }
}

/// Compact view of a past incident, used for recurrence detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    pub tier: RiskTier,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl From<&EscalationRecord> for IncidentSummary {
    fn from(record: &EscalationRecord) -> Self {
        Self {
            tier: record.tier,
            category: record.category.clone(),
            created_at: record.created_at,
        }
    }
}

/// The conversation's safety projection.
///
/// Merged into the conversation document; other conversation fields are
/// left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSafety {
    pub escalation_tier: RiskTier,
    pub escalation_status: RecordStatus,
    pub escalation_record_id: RecordId,
    pub is_in_safety_mode: bool,
    pub last_escalation_at: DateTime<Utc>,
}

impl ConversationSafety {
    /// Projection for the most recently recorded incident.
    pub fn from_record(record: &EscalationRecord) -> Self {
        Self {
            escalation_tier: record.tier,
            escalation_status: record.status,
            escalation_record_id: record.id.clone(),
            is_in_safety_mode: record.tier.is_critical(),
            last_escalation_at: record.created_at,
        }
    }
}
