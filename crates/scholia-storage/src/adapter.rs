//! Store adapter used by the turn orchestrator.
//!
//! Shapes conversations for persistence: on every write the full-text
//! `publications` payload of all but the newest message is dropped, bounding
//! both stored size and the prompts later built from history. Ids and titles
//! are retained so citation links in older turns keep working.

use std::sync::Arc;

use chrono::Utc;

use scholia_core::{Conversation, ConversationKind, Message};

use crate::store::{ConversationPatch, ConversationStore, StoreError};

/// Clear the `publications` payload of every message except the last.
pub fn prune_history(messages: &mut [Message]) {
    let keep_from = messages.len().saturating_sub(1);
    for message in &mut messages[..keep_from] {
        message.publications.clear();
    }
}

/// Pruning adapter over a raw [`ConversationStore`].
#[derive(Clone)]
pub struct Conversations {
    store: Arc<dyn ConversationStore>,
}

impl Conversations {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Create a conversation, stamping `last_modified` in the store.
    pub async fn create(
        &self,
        kind: ConversationKind,
        name: impl Into<String>,
        mut messages: Vec<Message>,
    ) -> Result<Conversation, StoreError> {
        prune_history(&mut messages);
        self.store.create(kind, name.into(), messages).await
    }

    /// Replace a conversation's messages, pruning stale payloads and
    /// refreshing `last_modified`.
    pub async fn update(
        &self,
        id: &str,
        kind: ConversationKind,
        name: impl Into<String>,
        mut messages: Vec<Message>,
    ) -> Result<Conversation, StoreError> {
        prune_history(&mut messages);
        let patch = ConversationPatch {
            kind,
            name: name.into(),
            last_modified: Utc::now(),
            messages,
        };
        self.store.update(id, patch).await
    }

    pub async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        self.store.list().await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        self.store.find_by_id(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn sourced_message(n: usize) -> Message {
        let mut m = Message::bot(format!("answer {} [1]", n));
        m.publication_ids = vec![format!("id-{}", n)];
        m.publication_titles = vec![format!("Title {}", n)];
        m.publications = vec![format!("Paper Number 1: Title {} fullText: body", n)];
        m
    }

    // ---- prune_history ----

    #[test]
    fn test_prune_clears_all_but_last() {
        let mut messages = vec![sourced_message(1), sourced_message(2), sourced_message(3)];
        prune_history(&mut messages);
        assert!(messages[0].publications.is_empty());
        assert!(messages[1].publications.is_empty());
        assert_eq!(messages[2].publications.len(), 1);
    }

    #[test]
    fn test_prune_keeps_ids_and_titles() {
        let mut messages = vec![sourced_message(1), sourced_message(2)];
        prune_history(&mut messages);
        assert_eq!(messages[0].publication_ids, vec!["id-1"]);
        assert_eq!(messages[0].publication_titles, vec!["Title 1"]);
    }

    #[test]
    fn test_prune_empty_and_single() {
        let mut messages: Vec<Message> = vec![];
        prune_history(&mut messages);

        let mut messages = vec![sourced_message(1)];
        prune_history(&mut messages);
        assert_eq!(messages[0].publications.len(), 1);
    }

    // ---- Adapter ----

    #[tokio::test]
    async fn test_update_prunes_before_write() {
        let adapter = Conversations::new(Arc::new(MemoryStore::new()));
        let conversation = adapter
            .create(ConversationKind::General, "c", vec![sourced_message(1)])
            .await
            .unwrap();

        let messages = vec![
            sourced_message(1),
            sourced_message(2),
            sourced_message(3),
            sourced_message(4),
            sourced_message(5),
        ];
        let updated = adapter
            .update(&conversation.id, ConversationKind::General, "c", messages)
            .await
            .unwrap();

        for message in &updated.messages[..4] {
            assert!(message.publications.is_empty());
            assert_eq!(message.publication_ids.len(), 1);
            assert_eq!(message.publication_titles.len(), 1);
        }
        assert_eq!(updated.messages[4].publications.len(), 1);
    }

    #[tokio::test]
    async fn test_update_refreshes_last_modified() {
        let adapter = Conversations::new(Arc::new(MemoryStore::new()));
        let conversation = adapter
            .create(ConversationKind::General, "c", vec![])
            .await
            .unwrap();
        let before = conversation.last_modified;

        let updated = adapter
            .update(
                &conversation.id,
                ConversationKind::General,
                "c",
                vec![Message::user("q")],
            )
            .await
            .unwrap();
        assert!(updated.last_modified >= before);
    }

    #[tokio::test]
    async fn test_adapter_passthrough_ops() {
        let adapter = Conversations::new(Arc::new(MemoryStore::new()));
        let conversation = adapter
            .create(ConversationKind::General, "c", vec![])
            .await
            .unwrap();

        assert_eq!(adapter.list().await.unwrap().len(), 1);
        assert!(adapter
            .find_by_id(&conversation.id)
            .await
            .unwrap()
            .is_some());
        adapter.delete(&conversation.id).await.unwrap();
        assert!(adapter.list().await.unwrap().is_empty());
    }
}
