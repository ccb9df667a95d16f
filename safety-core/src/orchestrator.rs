//! Escalation Orchestrator: composes the pipeline for one chat turn
//!
//! ```text
//! Idle ─► ConditionsLoaded ─► PromptBuilt ─► Classified ─► Normalized ─┬─► NoAction
//!   (repository failures degrade,          (classifier or parse        └─► IncidentRecorded
//!    never abort)                            failure ─► Unavailable)
//! ```
//!
//! Nothing escapes this boundary: every failure is logged, published as a
//! [`SafetyEvent`], and ends in an outcome the caller treats like tier 0.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::classifier::Classifier;
use crate::conditions::ConditionSet;
use crate::config::EngineConfig;
use crate::error::RepositoryError;
use crate::escalation::{ClassificationResult, RecordId, ResultNormalizer, RiskTier};
use crate::events::{SafetyEvent, SharedEventBus};
use crate::prompts::PromptBuilder;
use crate::recorder::IncidentRecorder;
use crate::state::{ChatTurn, ConditionRepository, HistoryRepository, IncidentSummary};

/// Shared reference to EscalationOrchestrator
pub type SharedEscalationOrchestrator = Arc<EscalationOrchestrator>;

/// Pipeline stage reached for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    ConditionsLoaded,
    PromptBuilt,
    Classified,
    Normalized,
    NoAction,
    IncidentRecorded,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ConditionsLoaded => write!(f, "conditions_loaded"),
            Self::PromptBuilt => write!(f, "prompt_built"),
            Self::Classified => write!(f, "classified"),
            Self::Normalized => write!(f, "normalized"),
            Self::NoAction => write!(f, "no_action"),
            Self::IncidentRecorded => write!(f, "incident_recorded"),
        }
    }
}

/// A call-site rule the orchestrator applied on top of normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSiteRule {
    /// Tier 1 above the confidence threshold escalates.
    ConfidentMonitor,
    /// Tier 1 raised to tier 2 for a recurring user.
    RecurrenceFloor,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    /// Classified; no incident required.
    NoAction { result: ClassificationResult },
    /// Classifier or parse failure. Equivalent to tier 0 for callers.
    Unavailable { stage: PipelineStage, reason: String },
    /// Incident written and conversation projection updated.
    IncidentRecorded {
        result: ClassificationResult,
        record_id: RecordId,
    },
    /// Qualifying result, but the incident write failed. `record_id` is set
    /// when the record exists without its projection.
    RecordingFailed {
        result: ClassificationResult,
        record_id: Option<RecordId>,
        error: String,
    },
}

impl ClassificationOutcome {
    pub fn result(&self) -> Option<&ClassificationResult> {
        match self {
            Self::NoAction { result }
            | Self::IncidentRecorded { result, .. }
            | Self::RecordingFailed { result, .. } => Some(result),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<ClassificationResult> {
        match self {
            Self::NoAction { result }
            | Self::IncidentRecorded { result, .. }
            | Self::RecordingFailed { result, .. } => Some(result),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::IncidentRecorded { record_id, .. } => Some(record_id),
            Self::RecordingFailed { record_id, .. } => record_id.as_deref(),
            _ => None,
        }
    }

    /// Terminal stage of the pipeline for this outcome.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::IncidentRecorded { .. } => PipelineStage::IncidentRecorded,
            Self::NoAction { .. } | Self::RecordingFailed { .. } => PipelineStage::NoAction,
            Self::Unavailable { .. } => PipelineStage::NoAction,
        }
    }
}

/// Apply the rules the normalizer does not own.
///
/// - tier 1 with `confidence > monitor_escalation_confidence` escalates
/// - with `enforce_recurrence_floor`, tier 1 becomes tier 2 once the user has
///   `recurrence_threshold` incidents in the window
pub fn apply_call_site_rules(
    result: &mut ClassificationResult,
    incident_count: usize,
    config: &EngineConfig,
) -> Vec<CallSiteRule> {
    let mut applied = Vec::new();
    if result.tier != RiskTier::MonitorOnly {
        return applied;
    }

    if config.enforce_recurrence_floor && incident_count >= config.recurrence_threshold {
        result.tier = RiskTier::ElevatedRisk;
        result.should_escalate = true;
        applied.push(CallSiteRule::RecurrenceFloor);
        return applied;
    }

    if result.confidence > config.monitor_escalation_confidence && !result.should_escalate {
        result.should_escalate = true;
        applied.push(CallSiteRule::ConfidentMonitor);
    }
    applied
}

/// Composes repositories, prompt builder, classifier, normalizer, and recorder.
pub struct EscalationOrchestrator {
    conditions: Arc<dyn ConditionRepository>,
    history: Arc<dyn HistoryRepository>,
    classifier: Arc<dyn Classifier>,
    recorder: IncidentRecorder,
    normalizer: ResultNormalizer,
    events: SharedEventBus,
    config: EngineConfig,
}

impl EscalationOrchestrator {
    pub fn new(
        conditions: Arc<dyn ConditionRepository>,
        history: Arc<dyn HistoryRepository>,
        classifier: Arc<dyn Classifier>,
        recorder: IncidentRecorder,
        events: SharedEventBus,
        config: EngineConfig,
    ) -> Self {
        Self {
            conditions,
            history,
            classifier,
            recorder,
            normalizer: ResultNormalizer::new(),
            events,
            config,
        }
    }

    /// Create a shared reference to this orchestrator
    pub fn shared(self) -> SharedEscalationOrchestrator {
        Arc::new(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Classify one message. `None` means classification was unavailable and
    /// must be treated exactly like tier 0.
    pub async fn classify_message(&self, turn: &ChatTurn) -> Option<ClassificationResult> {
        self.run(turn).await.into_result()
    }

    /// Run the full pipeline for one turn and report how it ended.
    #[instrument(
        skip(self, turn),
        fields(user_id = %turn.user_id, conversation_id = %turn.conversation_id, message_id = %turn.message_id)
    )]
    pub async fn run(&self, turn: &ChatTurn) -> ClassificationOutcome {
        let mut stage = PipelineStage::Idle;

        let conditions = self.load_conditions().await;
        stage = self.advance(stage, PipelineStage::ConditionsLoaded);

        let incident_count = self.count_recent_incidents(&turn.user_id).await;
        let prompt = PromptBuilder::new(&turn.message)
            .with_conditions(&conditions)
            .with_recent_messages(&turn.recent_messages)
            .with_mental_notes(&turn.mental_notes)
            .with_incident_count(incident_count)
            .alert_threshold(self.config.recurrence_threshold)
            .window_days(self.config.history_window_days)
            .max_message_chars(self.config.max_message_chars)
            .build();
        stage = self.advance(stage, PipelineStage::PromptBuilt);

        let timeout = self.config.classifier.timeout();
        let raw = match tokio::time::timeout(timeout, self.classifier.classify(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return self.unavailable(turn, stage, e.to_string()),
            Err(_) => {
                return self.unavailable(
                    turn,
                    stage,
                    format!("classifier timed out after {}ms", timeout.as_millis()),
                )
            }
        };
        stage = self.advance(stage, PipelineStage::Classified);

        let normalized = match self.normalizer.normalize(&raw) {
            Ok(normalized) => normalized,
            Err(e) => return self.unavailable(turn, stage, e.to_string()),
        };
        let mut result = normalized.result;
        for rule in apply_call_site_rules(&mut result, incident_count, &self.config) {
            info!(?rule, tier = %result.tier, confidence = result.confidence, "Call-site rule applied");
        }
        stage = self.advance(stage, PipelineStage::Normalized);

        self.events.publish(SafetyEvent::ClassificationCompleted {
            conversation_id: turn.conversation_id.clone(),
            message_id: turn.message_id.clone(),
            tier: result.tier,
            should_escalate: result.should_escalate,
            confidence: result.confidence,
            timestamp: Utc::now(),
        });

        if !result.qualifies_for_incident() {
            if result.tier == RiskTier::MonitorOnly && result.should_escalate {
                self.events.publish(SafetyEvent::MonitorFlagged {
                    user_id: turn.user_id.clone(),
                    conversation_id: turn.conversation_id.clone(),
                    category: result.category.clone(),
                    confidence: result.confidence,
                    timestamp: Utc::now(),
                });
            }
            self.advance(stage, PipelineStage::NoAction);
            return ClassificationOutcome::NoAction { result };
        }

        match self
            .recorder
            .record(
                &turn.user_id,
                &turn.conversation_id,
                &turn.message_id,
                &turn.message,
                &result,
            )
            .await
        {
            Ok(record_id) => {
                self.advance(stage, PipelineStage::IncidentRecorded);
                self.events.publish(SafetyEvent::IncidentRecorded {
                    record_id: record_id.clone(),
                    user_id: turn.user_id.clone(),
                    conversation_id: turn.conversation_id.clone(),
                    tier: result.tier,
                    timestamp: Utc::now(),
                });
                ClassificationOutcome::IncidentRecorded { result, record_id }
            }
            Err(e) => {
                // Fire-and-forget: the failure is reported, never raised.
                warn!(error = %e, "Incident recording failed; no retry");
                let record_id = e.orphaned_record_id().map(str::to_string);
                self.events.publish(SafetyEvent::RecordingFailed {
                    conversation_id: turn.conversation_id.clone(),
                    record_id: record_id.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                ClassificationOutcome::RecordingFailed {
                    result,
                    record_id,
                    error: e.to_string(),
                }
            }
        }
    }

    fn advance(&self, from: PipelineStage, to: PipelineStage) -> PipelineStage {
        debug!(%from, %to, "Escalation pipeline stage");
        to
    }

    fn unavailable(
        &self,
        turn: &ChatTurn,
        stage: PipelineStage,
        reason: String,
    ) -> ClassificationOutcome {
        warn!(%stage, classifier = self.classifier.name(), %reason, "Classification unavailable; treating as no escalation");
        self.events.publish(SafetyEvent::ClassificationUnavailable {
            conversation_id: turn.conversation_id.clone(),
            message_id: turn.message_id.clone(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        ClassificationOutcome::Unavailable { stage, reason }
    }

    /// Active conditions, or an empty set if the repository fails.
    async fn load_conditions(&self) -> ConditionSet {
        let timeout = self.config.repository_timeout();
        let loaded = match tokio::time::timeout(timeout, self.conditions.load_active_conditions()).await
        {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout {
                operation: "load_active_conditions",
                after_ms: timeout.as_millis() as u64,
            }),
        };
        match loaded {
            Ok(conditions) => ConditionSet::from_conditions(conditions),
            Err(e) => {
                warn!(error = %e, "Escalation conditions unavailable; using generic guidance");
                ConditionSet::empty()
            }
        }
    }

    /// Incidents inside the recurrence window, or zero if history fails.
    async fn count_recent_incidents(&self, user_id: &str) -> usize {
        let timeout = self.config.repository_timeout();
        let loaded = match tokio::time::timeout(
            timeout,
            self.history.load_recent_incidents(
                user_id,
                self.config.history_window_days,
                self.config.history_limit,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout {
                operation: "load_recent_incidents",
                after_ms: timeout.as_millis() as u64,
            }),
        };
        match loaded {
            Ok(incidents) => count_in_window(&incidents, self.config.history_window_days),
            Err(e) => {
                warn!(error = %e, "Incident history unavailable; assuming no recurrence");
                0
            }
        }
    }
}

/// Count incidents created within the last `window_days`.
pub fn count_in_window(incidents: &[IncidentSummary], window_days: u32) -> usize {
    let cutoff = Utc::now() - ChronoDuration::days(i64::from(window_days));
    incidents.iter().filter(|i| i.created_at >= cutoff).count()
}
