//! In-memory document store backing all three repositories
//!
//! Documents are JSON objects grouped into named collections. Writes to the
//! conversation collection use shallow merge semantics: fields in the patch
//! replace fields in the stored document, everything else is kept. The
//! whole store can be snapshotted to a pretty-printed JSON file and loaded
//! back.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::repository::{ConditionRepository, HistoryRepository, IncidentStore};
use super::schema::{
    fields, ALL_COLLECTIONS, COLLECTION_CONDITIONS, COLLECTION_CONVERSATIONS, COLLECTION_RECORDS,
};
use super::types::{ConversationSafety, IncidentSummary};
use crate::conditions::{sort_conditions, EscalationCondition};
use crate::error::{RepositoryError, StoreError};
use crate::escalation::EscalationRecord;

type Collection = BTreeMap<String, Value>;

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to DocumentStore
pub type SharedDocumentStore = Arc<DocumentStore>;

/// On-disk snapshot layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    collections: BTreeMap<String, Collection>,
}

/// In-memory JSON document store.
#[derive(Debug)]
pub struct DocumentStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl DocumentStore {
    /// Create an empty store with all collections present.
    pub fn new() -> Self {
        let collections = ALL_COLLECTIONS
            .iter()
            .map(|name| (name.to_string(), Collection::new()))
            .collect();
        Self {
            collections: RwLock::new(collections),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedDocumentStore {
        Arc::new(self)
    }

    // =========================================================================
    // Generic document operations
    // =========================================================================

    /// Insert or replace a document.
    pub async fn put_document(&self, collection: &str, id: &str, doc: Value) -> StoreResult<()> {
        if !doc.is_object() {
            return Err(StoreError::NotADocument {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    /// Insert a document that must not already exist.
    pub async fn insert_document(&self, collection: &str, id: &str, doc: Value) -> StoreResult<()> {
        if !doc.is_object() {
            return Err(StoreError::NotADocument {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.contains_key(id) {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        coll.insert(id.to_string(), doc);
        Ok(())
    }

    /// Shallow-merge `patch` into a document, creating it if missing.
    pub async fn merge_document(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let target = doc.as_object_mut().ok_or_else(|| StoreError::NotADocument {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        for (key, value) in patch {
            target.insert(key, value);
        }
        Ok(())
    }

    /// Fetch a raw document.
    pub async fn get_document(&self, collection: &str, id: &str) -> Option<Value> {
        let collections = self.collections.read().await;
        collections.get(collection).and_then(|c| c.get(id)).cloned()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    async fn typed_documents<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>, RepositoryError> {
        let collections = self.collections.read().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        coll.iter()
            .map(|(id, doc)| {
                serde_json::from_value(doc.clone()).map_err(|e| RepositoryError::Corrupt {
                    collection: collection.to_string(),
                    id: id.clone(),
                    detail: e.to_string(),
                })
            })
            .collect()
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    /// Insert or replace an escalation condition.
    pub async fn put_condition(&self, condition: &EscalationCondition) -> StoreResult<()> {
        let doc = serde_json::to_value(condition)?;
        self.put_document(COLLECTION_CONDITIONS, &condition.id, doc)
            .await
    }

    /// Insert or replace many conditions.
    pub async fn seed_conditions(&self, conditions: &[EscalationCondition]) -> StoreResult<()> {
        for condition in conditions {
            self.put_condition(condition).await?;
        }
        debug!(count = conditions.len(), "Seeded escalation conditions");
        Ok(())
    }

    /// Fetch one escalation record.
    pub async fn get_record(&self, id: &str) -> StoreResult<Option<EscalationRecord>> {
        match self.get_document(COLLECTION_RECORDS, id).await {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// All records for a user, newest first.
    pub async fn records_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<EscalationRecord>, RepositoryError> {
        let mut records: Vec<EscalationRecord> = self
            .typed_documents::<EscalationRecord>(COLLECTION_RECORDS)
            .await?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// All records for a conversation, oldest first.
    pub async fn records_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<EscalationRecord>, RepositoryError> {
        let mut records: Vec<EscalationRecord> = self
            .typed_documents::<EscalationRecord>(COLLECTION_RECORDS)
            .await?
            .into_iter()
            .filter(|r| r.conversation_id == conversation_id)
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Current safety projection of a conversation, if one was ever recorded.
    pub async fn conversation_safety(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Option<ConversationSafety>> {
        let Some(doc) = self
            .get_document(COLLECTION_CONVERSATIONS, conversation_id)
            .await
        else {
            return Ok(None);
        };
        if doc.get("escalationRecordId").is_none() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(doc)?))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Write every collection to a JSON file.
    pub async fn save_snapshot(&self, path: &Path) -> StoreResult<()> {
        let snapshot = Snapshot {
            collections: self.collections.read().await.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "Store snapshot saved");
        Ok(())
    }

    /// Load a store from a snapshot file. Returns `None` if the file does not exist.
    pub async fn load_snapshot(path: &Path) -> StoreResult<Option<Self>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        let store = Self::new();
        {
            let mut collections = store.collections.write().await;
            for (name, coll) in snapshot.collections {
                collections.insert(name, coll);
            }
        }
        info!(path = %path.display(), "Store snapshot loaded");
        Ok(Some(store))
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConditionRepository for DocumentStore {
    async fn load_active_conditions(&self) -> Result<Vec<EscalationCondition>, RepositoryError> {
        let mut conditions: Vec<EscalationCondition> = self
            .typed_documents::<EscalationCondition>(COLLECTION_CONDITIONS)
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .collect();
        sort_conditions(&mut conditions);
        Ok(conditions)
    }
}

#[async_trait]
impl HistoryRepository for DocumentStore {
    async fn load_recent_incidents(
        &self,
        user_id: &str,
        window_days: u32,
        limit: usize,
    ) -> Result<Vec<IncidentSummary>, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(i64::from(window_days));
        let incidents = self
            .records_for_user(user_id)
            .await?
            .iter()
            .filter(|r| r.created_at >= cutoff)
            .take(limit)
            .map(IncidentSummary::from)
            .collect();
        Ok(incidents)
    }
}

#[async_trait]
impl IncidentStore for DocumentStore {
    async fn insert_record(&self, record: &EscalationRecord) -> Result<(), StoreError> {
        let doc = serde_json::to_value(record)?;
        self.insert_document(COLLECTION_RECORDS, &record.id, doc)
            .await
    }

    async fn merge_conversation_safety(
        &self,
        conversation_id: &str,
        user_id: &str,
        safety: &ConversationSafety,
    ) -> Result<(), StoreError> {
        let Value::Object(mut patch) = serde_json::to_value(safety)? else {
            return Err(StoreError::NotADocument {
                collection: COLLECTION_CONVERSATIONS.to_string(),
                id: conversation_id.to_string(),
            });
        };
        patch.insert(
            fields::CONVERSATION_ID.to_string(),
            Value::String(conversation_id.to_string()),
        );
        patch.insert(fields::USER_ID.to_string(), Value::String(user_id.to_string()));
        self.merge_document(COLLECTION_CONVERSATIONS, conversation_id, patch)
            .await
    }
}
