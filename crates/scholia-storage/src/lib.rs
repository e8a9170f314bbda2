//! Conversation persistence.
//!
//! Defines the raw [`ConversationStore`] contract, in-memory and SQLite
//! implementations, and the [`Conversations`] adapter that shapes
//! conversations before they are written (pruning stale full-text payloads).

pub mod adapter;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use adapter::{prune_history, Conversations};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{ConversationPatch, ConversationStore, StoreError};
