//! Conversation data model.
//!
//! These types form the persistence contract shared by the chat pipeline and
//! the conversation store. Field names serialize in camelCase to match the
//! store's document format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    System,
}

/// A single message within a conversation.
///
/// The three publication arrays are either all empty or all the same length;
/// index *i* in each corresponds to the inline citation marker `[i+1]` in
/// `text`. `publications` carries the full source blocks and is cleared for
/// non-final messages when the conversation is persisted; `publication_ids`
/// and `publication_titles` are retained so citation links in older turns
/// stay functional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    /// Keyword query the retrieval for this message was based on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publication_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publication_titles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<String>,
}

impl Message {
    /// Create a plain user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(text, Sender::User)
    }

    /// Create a plain bot message without sources.
    pub fn bot(text: impl Into<String>) -> Self {
        Self::plain(text, Sender::Bot)
    }

    /// Create a system notice message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(text, Sender::System)
    }

    fn plain(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            concept: None,
            publication_ids: Vec::new(),
            publication_titles: Vec::new(),
            publications: Vec::new(),
        }
    }

    /// Whether the publication arrays satisfy the alignment invariant.
    pub fn sources_aligned(&self) -> bool {
        self.publication_ids.len() == self.publication_titles.len()
            && (self.publications.is_empty()
                || self.publications.len() == self.publication_ids.len())
    }
}

/// What a conversation is about: free-ranging chat over the whole corpus, or
/// a single document ("ask this paper").
///
/// Serialized as the literal string `"general"` or the raw document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationKind {
    General,
    Document(String),
}

impl ConversationKind {
    pub fn as_str(&self) -> &str {
        match self {
            ConversationKind::General => "general",
            ConversationKind::Document(id) => id,
        }
    }
}

impl From<&str> for ConversationKind {
    fn from(value: &str) -> Self {
        if value == "general" {
            ConversationKind::General
        } else {
            ConversationKind::Document(value.to_string())
        }
    }
}

impl Serialize for ConversationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConversationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ConversationKind::from(raw.as_str()))
    }
}

/// A persisted conversation.
///
/// The id is immutable once assigned by the store. Messages are append-only:
/// they are never reordered or deleted individually, only the `publications`
/// payload of non-final messages is cleared over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// A paper returned by the retrieval gateway, ranked order preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedPaper {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}
