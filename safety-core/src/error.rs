//! Error taxonomy for the safety pipeline
//!
//! Every failure class below the orchestrator boundary has its own type.
//! None of them is allowed to reach the chat-turn handler: repository
//! failures degrade to an empty context, classifier and malformed-response
//! failures end the turn as "classification unavailable", and persistence
//! failures are logged and swallowed by the orchestrator.

use thiserror::Error;

use crate::escalation::RiskTier;

/// Failure reading rule definitions or incident history.
///
/// Callers degrade to "no conditions" / "no history" and keep classifying.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("query against {collection} failed: {detail}")]
    Query { collection: String, detail: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("corrupt document {id} in {collection}: {detail}")]
    Corrupt {
        collection: String,
        id: String,
        detail: String,
    },
}

/// Failure talking to the external classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("classifier timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("classifier returned no content")]
    EmptyContent,

    #[error("classifier misconfigured: {0}")]
    Config(String),
}

/// The classifier answered, but not with a usable JSON object.
#[derive(Debug, Error)]
pub enum MalformedResponseError {
    #[error("no JSON object found in classifier output")]
    NoJsonObject,

    #[error("classifier output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("classifier output is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// Low-level document store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {id} already exists in {collection}")]
    Conflict { collection: String, id: String },

    #[error("document {id} in {collection} is not a JSON object")]
    NotADocument { collection: String, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one of the two incident-recording writes.
///
/// `ProjectionUpdate` is the documented partial-failure state: the
/// escalation record exists (and is the source of truth) but the
/// conversation's safety projection was not updated.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("result does not qualify for an incident (tier {tier}, should_escalate {should_escalate})")]
    NotQualifying { tier: RiskTier, should_escalate: bool },

    #[error("failed to insert escalation record: {source}")]
    RecordInsert {
        #[source]
        source: StoreError,
    },

    #[error("record {record_id} created but conversation projection not updated: {source}")]
    ProjectionUpdate {
        record_id: String,
        #[source]
        source: StoreError,
    },
}

impl PersistenceError {
    /// Id of a record that was written before the failure, if any.
    pub fn orphaned_record_id(&self) -> Option<&str> {
        match self {
            Self::ProjectionUpdate { record_id, .. } => Some(record_id),
            _ => None,
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(e: StoreError) -> Self {
        RepositoryError::Query {
            collection: "documents".to_string(),
            detail: e.to_string(),
        }
    }
}

/// Errors submitting work to the background queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("escalation queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("escalation queue is closed")]
    Closed,

    #[error("escalation worker failed: {0}")]
    Worker(String),
}

/// Errors loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_failure_exposes_orphaned_record() {
        let err = PersistenceError::ProjectionUpdate {
            record_id: "rec-1".to_string(),
            source: StoreError::Unavailable("down".to_string()),
        };
        assert_eq!(err.orphaned_record_id(), Some("rec-1"));
        assert!(err.to_string().contains("rec-1"));

        let err = PersistenceError::RecordInsert {
            source: StoreError::Unavailable("down".to_string()),
        };
        assert_eq!(err.orphaned_record_id(), None);
    }

    #[test]
    fn test_store_error_converts_to_repository_error() {
        let err: RepositoryError = StoreError::Unavailable("disk".to_string()).into();
        assert!(matches!(err, RepositoryError::Query { .. }));
    }
}
