//! Safety Escalation Library
//!
//! This library provides:
//! - Tiered risk classification of coaching-chat messages by an LLM
//! - Normalization that makes classifier output internally consistent
//! - Incident recording with a conversation-level safety projection
//! - A background queue so classification never blocks the reply path
//!
//! # Tiers
//!
//! - `0 None`: no concern
//! - `1 MonitorOnly`: coach attention, no incident
//! - `2 ElevatedRisk`: incident recorded, consent to hand off pending
//! - `3 CriticalRisk`: incident recorded, conversation enters safety mode
//!
//! # Usage
//!
//! ```ignore
//! use safety_core::{ChatTurn, EscalationOrchestrator, IncidentRecorder};
//!
//! let orchestrator = EscalationOrchestrator::new(
//!     store.clone(),
//!     store.clone(),
//!     classifier,
//!     IncidentRecorder::new(store.clone()),
//!     events,
//!     config,
//! );
//! let outcome = orchestrator
//!     .run(&ChatTurn::new("user-1", "conv-1", "msg-9", "I can't do this anymore"))
//!     .await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod classifier;
pub mod conditions;
pub mod config;
pub mod error;
pub mod escalation;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod queue;
pub mod recorder;
pub mod state;

// Re-export key pipeline types
pub use classifier::{ChatCompletionsClassifier, Classifier};
pub use conditions::{load_conditions_file, ConditionSet, EscalationCondition};
pub use config::{ClassifierConfig, EngineConfig};
pub use error::{
    ClassifierError, ConfigError, MalformedResponseError, PersistenceError, QueueError,
    RepositoryError, StoreError,
};
pub use escalation::{
    ClassificationResult, ConsentStatus, EscalationRecord, HandoffStatus, RecordId, RecordStatus,
    ResultNormalizer, RiskTier,
};
pub use events::{EventBus, EventFilter, SafetyEvent, SharedEventBus};
pub use orchestrator::{
    apply_call_site_rules, ClassificationOutcome, EscalationOrchestrator, PipelineStage,
    SharedEscalationOrchestrator,
};
pub use prompts::{build_prompt, ClassifierPrompt, PromptBuilder};
pub use queue::{EscalationQueue, QueueHandle, WorkerSummary};
pub use recorder::IncidentRecorder;
pub use state::{
    ChatTurn, ConversationMessage, ConversationSafety, DocumentStore, IncidentSummary,
    MessageRole, SharedDocumentStore,
};
