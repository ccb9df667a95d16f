//! Integration tests for the escalation pipeline
//!
//! Drives the orchestrator end to end against the in-memory document store
//! with scripted classifiers, covering classify → normalize → record.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use safety_core::prompts::PATTERN_ALERT;
use safety_core::state::IncidentStore;
use safety_core::{
    ChatTurn, ClassificationOutcome, ClassificationResult, Classifier, ClassifierError,
    ClassifierPrompt, DocumentStore, EngineConfig, EscalationCondition, EscalationOrchestrator,
    EscalationQueue, EscalationRecord, EventBus, IncidentRecorder, ResultNormalizer, RiskTier,
    SafetyEvent, SharedDocumentStore,
};

/// Returns a fixed response and remembers every prompt it saw.
struct RecordingClassifier {
    response: String,
    prompts: Mutex<Vec<ClassifierPrompt>>,
}

impl RecordingClassifier {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> ClassifierPrompt {
        self.prompts.lock().unwrap().last().cloned().expect("no prompt recorded")
    }
}

#[async_trait]
impl Classifier for RecordingClassifier {
    async fn classify(&self, prompt: &ClassifierPrompt) -> Result<String, ClassifierError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Never answers within any sane timeout.
struct StalledClassifier;

#[async_trait]
impl Classifier for StalledClassifier {
    async fn classify(&self, _prompt: &ClassifierPrompt) -> Result<String, ClassifierError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(r#"{"tier": 3}"#.to_string())
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

fn orchestrator(
    store: &SharedDocumentStore,
    classifier: Arc<dyn Classifier>,
    config: EngineConfig,
) -> EscalationOrchestrator {
    EscalationOrchestrator::new(
        store.clone(),
        store.clone(),
        classifier,
        IncidentRecorder::new(store.clone()),
        EventBus::new().shared(),
        config,
    )
}

fn condition(id: &str, tier: RiskTier, title: &str) -> EscalationCondition {
    EscalationCondition {
        id: id.to_string(),
        tier,
        category: "self-harm".to_string(),
        title: title.to_string(),
        description: "Statements about harming oneself".to_string(),
        example_phrases: vec!["I want to disappear".to_string()],
        keywords: BTreeSet::from(["disappear".to_string()]),
        priority: 10,
        is_active: true,
    }
}

fn prior_incident(user_id: &str, days_ago: i64) -> EscalationRecord {
    let result = ClassificationResult {
        tier: RiskTier::ElevatedRisk,
        category: "burnout".to_string(),
        reason: "prior".to_string(),
        confidence: 0.7,
        should_escalate: true,
        suggested_response: None,
    };
    EscalationRecord::new(user_id, "old-conv", "old-msg", "earlier message", &result)
        .with_created_at(Utc::now() - ChronoDuration::days(days_ago))
}

/// Test: critical tier with shouldEscalate=false is forced on and recorded
#[tokio::test]
async fn test_critical_override_records_incident() {
    let normalized = ResultNormalizer::new()
        .normalize(r#"{"tier": 3, "shouldEscalate": false, "category": "self-harm", "confidence": 0.9}"#)
        .unwrap();
    assert!(normalized.result.should_escalate);

    let store = DocumentStore::new().shared();
    let classifier = RecordingClassifier::new(
        r#"{"tier": 3, "shouldEscalate": false, "category": "self-harm", "reason": "explicit", "confidence": 0.9, "suggestedResponse": "You matter."}"#,
    );
    let orchestrator = orchestrator(&store, classifier, EngineConfig::default());
    let mut events = orchestrator.events().subscribe();

    let outcome = orchestrator
        .run(&ChatTurn::new("user-1", "conv-1", "msg-1", "I want to disappear"))
        .await;
    let record_id = outcome.record_id().expect("incident recorded").to_string();

    let record = store.get_record(&record_id).await.unwrap().unwrap();
    assert_eq!(record.tier, RiskTier::CriticalRisk);
    assert_eq!(record.trigger_message_id, "msg-1");
    let safety = store.conversation_safety("conv-1").await.unwrap().unwrap();
    assert!(safety.is_in_safety_mode);

    let first = events.recv().await.unwrap();
    assert_eq!(first.event_type(), "classification_completed");
    let second = events.recv().await.unwrap();
    assert!(matches!(second, SafetyEvent::IncidentRecorded { tier: RiskTier::CriticalRisk, .. }));
}

/// Test: tier 0 with shouldEscalate=true is forced off and nothing is written
#[tokio::test]
async fn test_no_concern_override_writes_nothing() {
    let store = DocumentStore::new().shared();
    let classifier = RecordingClassifier::new(r#"{"tier": 0, "shouldEscalate": true}"#);
    let orchestrator = orchestrator(&store, classifier, EngineConfig::default());

    let result = orchestrator
        .classify_message(&ChatTurn::new("user-1", "conv-1", "msg-1", "rough week at work"))
        .await
        .unwrap();
    assert_eq!(result.tier, RiskTier::None);
    assert!(!result.should_escalate);
    assert!(store.records_for_user("user-1").await.unwrap().is_empty());
    assert!(store.conversation_safety("conv-1").await.unwrap().is_none());
}

/// Test: confident monitor-only result escalates without an incident
#[tokio::test]
async fn test_confident_monitor_escalates_without_incident() {
    let store = DocumentStore::new().shared();
    let classifier = RecordingClassifier::new(
        r#"{"tier": 1, "confidence": 0.9, "shouldEscalate": false, "category": "stress"}"#,
    );
    let orchestrator = orchestrator(&store, classifier, EngineConfig::default());
    let mut events = orchestrator.events().subscribe();

    let outcome = orchestrator
        .run(&ChatTurn::new("user-1", "conv-1", "msg-1", "I'm not sleeping"))
        .await;
    let ClassificationOutcome::NoAction { result } = outcome else {
        panic!("monitor-only results never record incidents");
    };
    assert_eq!(result.tier, RiskTier::MonitorOnly);
    assert!(result.should_escalate);
    assert!(store.records_for_user("user-1").await.unwrap().is_empty());

    assert_eq!(events.recv().await.unwrap().event_type(), "classification_completed");
    assert_eq!(events.recv().await.unwrap().event_type(), "monitor_flagged");
}

/// Test: an empty object normalizes to all defaults
#[tokio::test]
async fn test_empty_object_defaults() {
    let store = DocumentStore::new().shared();
    let orchestrator = orchestrator(&store, RecordingClassifier::new("{}"), EngineConfig::default());

    let result = orchestrator
        .classify_message(&ChatTurn::new("u", "c", "m", "hi"))
        .await
        .unwrap();
    assert_eq!(result.tier, RiskTier::None);
    assert_eq!(result.category, "general");
    assert_eq!(result.confidence, 0.5);
    assert!(!result.should_escalate);
    assert_eq!(result.suggested_response, None);
}

/// Test: a stalled classifier yields no result and no record
#[tokio::test(start_paused = true)]
async fn test_classifier_timeout_yields_none() {
    let store = DocumentStore::new().shared();
    let mut config = EngineConfig::default();
    config.classifier.timeout_ms = 50;
    let orchestrator = orchestrator(&store, Arc::new(StalledClassifier), config);
    let mut events = orchestrator.events().subscribe();

    let result = orchestrator
        .classify_message(&ChatTurn::new("user-1", "conv-1", "msg-1", "I want to disappear"))
        .await;
    assert!(result.is_none());
    assert!(store.records_for_user("user-1").await.unwrap().is_empty());

    let SafetyEvent::ClassificationUnavailable { reason, .. } = events.recv().await.unwrap() else {
        panic!("timeout must be reported");
    };
    assert!(reason.contains("timed out"));
}

/// Test: three recent incidents put the pattern alert into the prompt
#[tokio::test]
async fn test_recurrence_adds_pattern_alert() {
    let store = DocumentStore::new().shared();
    store
        .seed_conditions(&[condition("c-3", RiskTier::CriticalRisk, "Self-harm intent")])
        .await
        .unwrap();
    for days_ago in [2, 9, 20] {
        store.insert_record(&prior_incident("user-7", days_ago)).await.unwrap();
    }

    let classifier = RecordingClassifier::new(r#"{"tier": 1, "confidence": 0.4}"#);
    let orchestrator = orchestrator(&store, classifier.clone(), EngineConfig::default());
    let result = orchestrator
        .classify_message(&ChatTurn::new("user-7", "conv-9", "msg-1", "things are just... a lot"))
        .await
        .unwrap();

    let prompt = classifier.last_prompt();
    assert!(prompt.user.contains(PATTERN_ALERT));
    assert!(prompt.system.contains("Self-harm intent"));
    // Recurrence only shapes the prompt by default.
    assert_eq!(result.tier, RiskTier::MonitorOnly);
    assert!(!result.should_escalate);
}

/// Test: the configured threshold and window shape the prompt
#[tokio::test]
async fn test_configured_recurrence_threshold_and_window() {
    let store = DocumentStore::new().shared();
    for days_ago in [1, 6] {
        store.insert_record(&prior_incident("user-5", days_ago)).await.unwrap();
    }
    let mut config = EngineConfig::default();
    config.recurrence_threshold = 2;
    config.history_window_days = 7;
    config.enforce_recurrence_floor = true;
    config.validate().unwrap();

    let classifier = RecordingClassifier::new(r#"{"tier": 1, "confidence": 0.3}"#);
    let orchestrator = orchestrator(&store, classifier.clone(), config);
    let outcome = orchestrator
        .run(&ChatTurn::new("user-5", "conv-5", "msg-1", "not great again"))
        .await;

    let prompt = classifier.last_prompt();
    assert!(prompt.user.contains(PATTERN_ALERT));
    assert!(prompt.user.contains("in the last 7 days"));
    assert!(!prompt.user.contains("30 days"));
    assert!(matches!(outcome, ClassificationOutcome::IncidentRecorded { .. }));
}

/// Test: incidents outside the window do not trigger the alert
#[tokio::test]
async fn test_old_incidents_do_not_alert() {
    let store = DocumentStore::new().shared();
    for days_ago in [2, 45, 60] {
        store.insert_record(&prior_incident("user-7", days_ago)).await.unwrap();
    }

    let classifier = RecordingClassifier::new(r#"{"tier": 0}"#);
    let orchestrator = orchestrator(&store, classifier.clone(), EngineConfig::default());
    orchestrator
        .classify_message(&ChatTurn::new("user-7", "conv-9", "msg-1", "hello"))
        .await
        .unwrap();
    assert!(!classifier.last_prompt().user.contains(PATTERN_ALERT));
}

/// Test: enforced recurrence floor raises tier 1 to an incident
#[tokio::test]
async fn test_enforced_recurrence_floor_records() {
    let store = DocumentStore::new().shared();
    for days_ago in [1, 3, 5] {
        store.insert_record(&prior_incident("user-8", days_ago)).await.unwrap();
    }
    let mut config = EngineConfig::default();
    config.enforce_recurrence_floor = true;

    let orchestrator = orchestrator(
        &store,
        RecordingClassifier::new(r#"{"tier": 1, "confidence": 0.3}"#),
        config,
    );
    let outcome = orchestrator
        .run(&ChatTurn::new("user-8", "conv-2", "msg-4", "same as always"))
        .await;
    assert!(matches!(outcome, ClassificationOutcome::IncidentRecorded { .. }));
    assert_eq!(store.records_for_user("user-8").await.unwrap().len(), 4);
}

/// Test: repeated recording keeps safety mode aligned with the last record
#[tokio::test]
async fn test_safety_mode_follows_last_applied_record() {
    let store = DocumentStore::new().shared();
    let recorder = IncidentRecorder::new(store.clone());
    let critical = ClassificationResult {
        tier: RiskTier::CriticalRisk,
        should_escalate: true,
        confidence: 0.95,
        ..Default::default()
    };
    let elevated = ClassificationResult {
        tier: RiskTier::ElevatedRisk,
        should_escalate: true,
        confidence: 0.7,
        ..Default::default()
    };

    let mut ids = Vec::new();
    for result in [&critical, &critical, &elevated, &critical] {
        let id = recorder.record("u", "conv", "m", "t", result).await.unwrap();
        ids.push(id);
        let safety = store.conversation_safety("conv").await.unwrap().unwrap();
        assert_eq!(safety.is_in_safety_mode, result.tier == RiskTier::CriticalRisk);
        assert_eq!(safety.escalation_record_id, *ids.last().unwrap());
    }
    let distinct: BTreeSet<_> = ids.iter().collect();
    assert_eq!(distinct.len(), 4);
}

/// Test: queued turns are all processed before shutdown returns
#[tokio::test]
async fn test_queue_processes_turns_in_background() {
    let store = DocumentStore::new().shared();
    let classifier = RecordingClassifier::new(r#"{"tier": 2, "category": "burnout", "confidence": 0.7}"#);
    let orchestrator = orchestrator(&store, classifier.clone(), EngineConfig::default()).shared();
    let queue = EscalationQueue::start(orchestrator, 16);

    for i in 0..5 {
        queue
            .submit(ChatTurn::new("user-q", format!("conv-{i}"), format!("msg-{i}"), "I'm exhausted"))
            .unwrap();
    }
    let summary = queue.shutdown().await.unwrap();

    assert_eq!(summary.processed, 5);
    assert_eq!(summary.incidents_recorded, 5);
    assert_eq!(classifier.prompts.lock().unwrap().len(), 5);
    assert_eq!(store.records_for_user("user-q").await.unwrap().len(), 5);
}

/// Test: a snapshot round-trip keeps incidents visible to history
#[tokio::test]
async fn test_snapshot_preserves_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = DocumentStore::new().shared();
    store.insert_record(&prior_incident("user-s", 3)).await.unwrap();
    store.save_snapshot(&path).await.unwrap();

    let restored = DocumentStore::load_snapshot(&path).await.unwrap().unwrap().shared();
    assert_eq!(restored.records_for_user("user-s").await.unwrap().len(), 1);
}
