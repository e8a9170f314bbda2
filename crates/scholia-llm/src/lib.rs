//! Language-model gateway.
//!
//! A stateless request/response wrapper around an OpenAI-compatible
//! chat-completion API, behind the [`LlmGateway`] trait so the chat pipeline
//! can be exercised with scripted backends in tests.

pub mod error;
pub mod gateway;
pub mod openai;

pub use error::LlmError;
pub use gateway::{ChatMessage, CompletionRequest, LlmGateway, Role};
pub use openai::OpenAiGateway;
