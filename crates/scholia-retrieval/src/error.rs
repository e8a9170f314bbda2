//! Error types for the retrieval gateway.

use scholia_core::ScholiaError;

/// Errors from the ranked-search backend or the full-text resolver.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search backend error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("knowledge-graph error: {0}")]
    KnowledgeGraph(String),
}

impl From<RetrievalError> for ScholiaError {
    fn from(err: RetrievalError) -> Self {
        ScholiaError::Retrieval(err.to_string())
    }
}
