//! Error types for the language-model gateway.

use scholia_core::ScholiaError;

/// Errors from the chat-completion gateway.
///
/// A missing or invalid API key must be distinguishable from an empty reply,
/// so the orchestrator can surface the right notice to the user.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("response contained no choices")]
    EmptyResponse,
}

impl From<LlmError> for ScholiaError {
    fn from(err: LlmError) -> Self {
        ScholiaError::Gateway(err.to_string())
    }
}
