//! Application configuration.
//!
//! Loaded from a TOML file. Each section corresponds to one of the external
//! collaborators or to the chat pipeline's own knobs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScholiaError};

/// Top-level configuration for Scholia.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScholiaConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl ScholiaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScholiaConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScholiaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Chat-completion gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key for the chat-completion backend. Empty means unconfigured.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Default model when a request does not name one.
    pub model: String,
    /// Default completion token cap when a request does not set one.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1000,
            timeout_secs: 30,
        }
    }
}

/// Ranked-search backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// URL of the ranked-search endpoint.
    pub base_url: String,
    /// Maximum number of papers requested per query.
    pub limit: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/publications".to_string(),
            limit: 5,
            timeout_secs: 10,
        }
    }
}

/// Pipeline knobs for the chat core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Trailing history window for corpus-wide conversations.
    pub history_turns: usize,
    /// Trailing history window for single-document conversations.
    pub paper_history_turns: usize,
    /// Token budget shared by the full texts embedded in one prompt.
    pub max_context_tokens: usize,
    /// Approximate characters per token used to convert the budget.
    pub chars_per_token: usize,
    /// Papers kept for grounding, upper bound on citation markers.
    pub max_papers: usize,
    /// Token budget for the document text in follow-up question prompts.
    pub followup_context_tokens: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: 8,
            paper_history_turns: 10,
            max_context_tokens: 100_000,
            chars_per_token: 4,
            max_papers: 5,
            followup_context_tokens: 120_000,
        }
    }
}
