//! Collection names for the document store
//!
//! Each collection holds one logical document type, keyed by document id.

/// Admin-authored escalation conditions
pub const COLLECTION_CONDITIONS: &str = "escalation_conditions";

/// Append-only escalation records
pub const COLLECTION_RECORDS: &str = "escalation_records";

/// Conversation documents (safety projection merged in)
pub const COLLECTION_CONVERSATIONS: &str = "conversations";

/// All collection names
pub const ALL_COLLECTIONS: &[&str] = &[
    COLLECTION_CONDITIONS,
    COLLECTION_RECORDS,
    COLLECTION_CONVERSATIONS,
];

/// Document field names shared between writers and queries
pub mod fields {
    pub const USER_ID: &str = "userId";
    pub const CONVERSATION_ID: &str = "conversationId";
}
