//! Repository seams between the pipeline and persistence
//!
//! Reads (conditions, history) degrade gracefully in the orchestrator; writes
//! go through [`IncidentStore`] and are only ever called by the incident
//! recorder.

use async_trait::async_trait;

use super::types::{ConversationSafety, IncidentSummary};
use crate::conditions::EscalationCondition;
use crate::error::{RepositoryError, StoreError};
use crate::escalation::EscalationRecord;

/// Default rolling window for recurrence detection.
pub const DEFAULT_HISTORY_WINDOW_DAYS: u32 = 30;

/// Default cap on incidents loaded per user.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Source of active escalation-condition definitions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConditionRepository: Send + Sync {
    /// Active conditions ordered by (tier ascending, priority descending).
    async fn load_active_conditions(&self) -> Result<Vec<EscalationCondition>, RepositoryError>;
}

/// Source of a user's recent escalation incidents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Incidents created within `window_days`, newest first, at most `limit`.
    async fn load_recent_incidents(
        &self,
        user_id: &str,
        window_days: u32,
        limit: usize,
    ) -> Result<Vec<IncidentSummary>, RepositoryError>;
}

/// Write side used by the incident recorder.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Insert a new record. Records are append-only; an existing id is a conflict.
    async fn insert_record(&self, record: &EscalationRecord) -> Result<(), StoreError>;

    /// Merge the safety projection into the conversation document, creating
    /// the document if it does not exist. Fields outside the projection are
    /// preserved.
    async fn merge_conversation_safety(
        &self,
        conversation_id: &str,
        user_id: &str,
        safety: &ConversationSafety,
    ) -> Result<(), StoreError>;
}
