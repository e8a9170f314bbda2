//! Core types for the Scholia conversational literature assistant.
//!
//! Defines the conversation data model shared across the workspace,
//! TOML-backed configuration, and the top-level error type.

pub mod config;
pub mod error;
pub mod types;

pub use config::ScholiaConfig;
pub use error::{Result, ScholiaError};
pub use types::{Conversation, ConversationKind, Message, RetrievedPaper, Sender};
