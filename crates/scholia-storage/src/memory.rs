//! In-memory conversation store.
//!
//! Backs tests and ephemeral sessions; no durability.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use scholia_core::{Conversation, ConversationKind, Message};

use crate::store::{ConversationPatch, ConversationStore, StoreError};

/// HashMap-backed [`ConversationStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Conversation>>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(format!("store lock poisoned: {}", e)))
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryStore {
    async fn create(
        &self,
        kind: ConversationKind,
        name: String,
        messages: Vec<Message>,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            kind,
            name,
            last_modified: Utc::now(),
            messages,
        };
        self.lock()?
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn update(
        &self,
        id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation, StoreError> {
        let mut inner = self.lock()?;
        let conversation = inner
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        conversation.kind = patch.kind;
        conversation.name = patch.name;
        conversation.last_modified = patch.last_modified;
        conversation.messages = patch.messages;
        Ok(conversation.clone())
    }

    async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let mut conversations: Vec<Conversation> = self.lock()?.values().cloned().collect();
        conversations.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(conversations)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
