//! Error types for the chat pipeline.

use scholia_core::ScholiaError;
use scholia_retrieval::RetrievalError;
use scholia_storage::StoreError;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("a turn is already in flight for conversation {0}")]
    TurnInProgress(String),
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("no API key configured")]
    MissingApiKey,
    #[error("classification error: {0}")]
    Classification(String),
    #[error("retrieval error: {0}")]
    Retrieval(String),
    #[error("synthesis error: {0}")]
    Synthesis(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<RetrievalError> for ChatError {
    fn from(err: RetrievalError) -> Self {
        ChatError::Retrieval(err.to_string())
    }
}

impl From<ChatError> for ScholiaError {
    fn from(err: ChatError) -> Self {
        ScholiaError::Chat(err.to_string())
    }
}
