use thiserror::Error;

/// Top-level error type for the Scholia system.
///
/// Each variant wraps a subsystem-specific error. Subsystem crates define
/// their own error types and convert into `ScholiaError` at the boundary so
/// that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScholiaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Language-model gateway error: {0}")]
    Gateway(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ScholiaError {
    fn from(err: toml::de::Error) -> Self {
        ScholiaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScholiaError {
    fn from(err: toml::ser::Error) -> Self {
        ScholiaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScholiaError {
    fn from(err: serde_json::Error) -> Self {
        ScholiaError::Serialization(err.to_string())
    }
}

/// Convenience result alias using [`ScholiaError`].
pub type Result<T> = std::result::Result<T, ScholiaError>;
