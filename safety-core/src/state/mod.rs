//! State module for escalation conditions, incident history, and conversations
//!
//! # Architecture
//!
//! Three logical collections back the pipeline:
//!
//! - `escalation_conditions`: admin-authored rules (read-only here)
//! - `escalation_records`: append-only incidents, queried per user for recurrence
//! - `conversations`: conversation documents; the safety projection is merged in
//!
//! The pipeline only depends on the repository traits. [`DocumentStore`] is
//! the in-memory implementation used by the worker binary and tests.
//!
//! # Usage
//!
//! ```ignore
//! use safety_core::state::{DocumentStore, HistoryRepository};
//!
//! let store = DocumentStore::new().shared();
//! let recent = store.load_recent_incidents("user-1", 30, 5).await?;
//! ```

pub mod repository;
pub mod schema;
pub mod store;
pub mod types;

pub use repository::{
    ConditionRepository, HistoryRepository, IncidentStore, DEFAULT_HISTORY_LIMIT,
    DEFAULT_HISTORY_WINDOW_DAYS,
};
pub use store::{DocumentStore, SharedDocumentStore, StoreResult};
pub use types::{
    ChatTurn, ConversationMessage, ConversationSafety, IncidentSummary, MessageRole,
};
