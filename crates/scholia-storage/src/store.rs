//! Raw conversation-store contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scholia_core::{Conversation, ConversationKind, Message, ScholiaError};

/// Errors from a conversation store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for ScholiaError {
    fn from(err: StoreError) -> Self {
        ScholiaError::Storage(err.to_string())
    }
}

/// Replacement state written by an update. The conversation id is immutable
/// and therefore not part of the patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    pub kind: ConversationKind,
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// A conversation store scoped to one user by the hosting layer.
///
/// Operations are reliable, retryable, and idempotent by id; the engine
/// behind them is an external collaborator.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation, assigning its id.
    async fn create(
        &self,
        kind: ConversationKind,
        name: String,
        messages: Vec<Message>,
    ) -> Result<Conversation, StoreError>;

    /// Replace a conversation's mutable state, returning the stored result.
    async fn update(&self, id: &str, patch: ConversationPatch)
        -> Result<Conversation, StoreError>;

    /// All conversations of the owning user.
    async fn list(&self) -> Result<Vec<Conversation>, StoreError>;

    /// Look up one conversation.
    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Remove a conversation. Deletion only ever happens on explicit user
    /// request.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
