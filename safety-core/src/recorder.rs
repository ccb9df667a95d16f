//! Incident Recorder: two-step write for qualifying classifications
//!
//! ```text
//! step 1: insert EscalationRecord        ── fails → RecordInsert      (nothing written)
//!            │
//! step 2: merge conversation projection  ── fails → ProjectionUpdate  (record exists)
//!            │
//!            ▼
//!        RecordId
//! ```
//!
//! The writes are not one transaction. The record is the source of truth: a
//! failure after step 1 leaves a detectable orphan (its id is carried in the
//! error) rather than a lost incident. Nothing is retried.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::PersistenceError;
use crate::escalation::{ClassificationResult, EscalationRecord, RecordId};
use crate::state::{ConversationSafety, IncidentStore};

/// Writes escalation records and the conversation safety projection.
#[derive(Clone)]
pub struct IncidentRecorder {
    store: Arc<dyn IncidentStore>,
}

impl IncidentRecorder {
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }

    /// Record an incident for a qualifying result.
    ///
    /// Only tier 2/3 results with `should_escalate` qualify; anything else is
    /// rejected before any write.
    pub async fn record(
        &self,
        user_id: &str,
        conversation_id: &str,
        trigger_message_id: &str,
        trigger_content: &str,
        result: &ClassificationResult,
    ) -> Result<RecordId, PersistenceError> {
        if !result.qualifies_for_incident() {
            return Err(PersistenceError::NotQualifying {
                tier: result.tier,
                should_escalate: result.should_escalate,
            });
        }

        let record = EscalationRecord::new(
            user_id,
            conversation_id,
            trigger_message_id,
            trigger_content,
            result,
        );

        if let Err(source) = self.store.insert_record(&record).await {
            error!(
                user_id,
                conversation_id,
                tier = %record.tier,
                error = %source,
                "Failed to insert escalation record"
            );
            return Err(PersistenceError::RecordInsert { source });
        }

        let safety = ConversationSafety::from_record(&record);
        if let Err(source) = self
            .store
            .merge_conversation_safety(conversation_id, user_id, &safety)
            .await
        {
            error!(
                record_id = %record.id,
                conversation_id,
                error = %source,
                "Escalation record created but conversation projection not updated"
            );
            return Err(PersistenceError::ProjectionUpdate {
                record_id: record.id,
                source,
            });
        }

        info!(
            record_id = %record.id,
            user_id,
            conversation_id,
            tier = %record.tier,
            category = %record.category,
            safety_mode = safety.is_in_safety_mode,
            "Escalation incident recorded"
        );
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::escalation::{ConsentStatus, RiskTier};
    use crate::state::DocumentStore;
    use async_trait::async_trait;

    fn result(tier: RiskTier, should_escalate: bool) -> ClassificationResult {
        ClassificationResult {
            tier,
            category: "self-harm".to_string(),
            reason: "explicit statement".to_string(),
            confidence: 0.93,
            should_escalate,
            suggested_response: None,
        }
    }

    /// Store whose projection write always fails.
    struct ProjectionDown {
        inner: DocumentStore,
    }

    #[async_trait]
    impl IncidentStore for ProjectionDown {
        async fn insert_record(&self, record: &EscalationRecord) -> Result<(), StoreError> {
            self.inner.insert_record(record).await
        }

        async fn merge_conversation_safety(
            &self,
            _conversation_id: &str,
            _user_id: &str,
            _safety: &ConversationSafety,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("conversations offline".to_string()))
        }
    }

    /// Store whose record insert always fails.
    struct InsertDown;

    #[async_trait]
    impl IncidentStore for InsertDown {
        async fn insert_record(&self, _record: &EscalationRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("records offline".to_string()))
        }

        async fn merge_conversation_safety(
            &self,
            _conversation_id: &str,
            _user_id: &str,
            _safety: &ConversationSafety,
        ) -> Result<(), StoreError> {
            panic!("projection must not be written when the insert fails");
        }
    }

    #[tokio::test]
    async fn test_record_critical_incident() {
        let store = DocumentStore::new().shared();
        let recorder = IncidentRecorder::new(store.clone());

        let id = recorder
            .record("user-1", "conv-1", "msg-1", "I want to disappear", &result(RiskTier::CriticalRisk, true))
            .await
            .unwrap();

        let record = store.get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.consent_status, ConsentStatus::NotRequired);
        assert_eq!(record.trigger_message_id, "msg-1");
        assert_eq!(record.trigger_content, "I want to disappear");

        let safety = store.conversation_safety("conv-1").await.unwrap().unwrap();
        assert!(safety.is_in_safety_mode);
        assert_eq!(safety.escalation_tier, RiskTier::CriticalRisk);
        assert_eq!(safety.escalation_record_id, id);
    }

    #[tokio::test]
    async fn test_rejects_non_qualifying_results() {
        let store = DocumentStore::new().shared();
        let recorder = IncidentRecorder::new(store.clone());

        for (tier, flag) in [
            (RiskTier::None, false),
            (RiskTier::MonitorOnly, true),
            (RiskTier::ElevatedRisk, false),
        ] {
            let err = recorder
                .record("u", "c", "m", "t", &result(tier, flag))
                .await
                .unwrap_err();
            assert!(matches!(err, PersistenceError::NotQualifying { .. }));
        }
        assert!(store.records_for_user("u").await.unwrap().is_empty());
        assert!(store.conversation_safety("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeat_recording_creates_distinct_records() {
        let store = DocumentStore::new().shared();
        let recorder = IncidentRecorder::new(store.clone());
        let critical = result(RiskTier::CriticalRisk, true);
        let elevated = result(RiskTier::ElevatedRisk, true);

        let first = recorder.record("u", "c", "m", "t", &critical).await.unwrap();
        let second = recorder.record("u", "c", "m", "t", &critical).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.records_for_conversation("c").await.unwrap().len(), 2);
        let safety = store.conversation_safety("c").await.unwrap().unwrap();
        assert_eq!(safety.escalation_record_id, second);
        assert!(safety.is_in_safety_mode);

        // The most recently applied record wins, even when it lowers the tier.
        let third = recorder.record("u", "c", "m", "t", &elevated).await.unwrap();
        let safety = store.conversation_safety("c").await.unwrap().unwrap();
        assert_eq!(safety.escalation_record_id, third);
        assert!(!safety.is_in_safety_mode);
    }

    #[tokio::test]
    async fn test_projection_failure_keeps_record() {
        let store = Arc::new(ProjectionDown {
            inner: DocumentStore::new(),
        });
        let recorder = IncidentRecorder::new(store.clone());

        let err = recorder
            .record("u", "c", "m", "t", &result(RiskTier::ElevatedRisk, true))
            .await
            .unwrap_err();
        let orphan = err.orphaned_record_id().unwrap().to_string();
        assert!(store.inner.get_record(&orphan).await.unwrap().is_some());
        assert!(store.inner.conversation_safety("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_failure_writes_nothing() {
        let recorder = IncidentRecorder::new(Arc::new(InsertDown));
        let err = recorder
            .record("u", "c", "m", "t", &result(RiskTier::CriticalRisk, true))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::RecordInsert { .. }));
        assert_eq!(err.orphaned_record_id(), None);
    }
}
