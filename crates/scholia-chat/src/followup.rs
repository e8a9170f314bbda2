//! Suggested follow-up questions for single-document conversations.
//!
//! After each successful answer, an independent gateway call produces exactly
//! three new questions the document can answer, de-duplicated against
//! everything the user already asked.

use std::sync::LazyLock;

use regex::Regex;

use scholia_core::config::ChatConfig;
use scholia_llm::{ChatMessage, LlmError};

use crate::bridge::GatewayBridge;
use crate::context::truncate_to_chars;

static ORDINAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("Invalid ordinal regex"));

/// Generates three suggested follow-up questions for a document.
#[derive(Clone)]
pub struct FollowUpGenerator {
    bridge: GatewayBridge,
    max_document_chars: usize,
}

impl FollowUpGenerator {
    pub fn new(bridge: GatewayBridge, config: &ChatConfig) -> Self {
        Self {
            bridge,
            max_document_chars: config.followup_context_tokens * config.chars_per_token,
        }
    }

    /// Ask for three fresh questions answerable by `document_text`,
    /// avoiding everything in `asked`.
    pub async fn generate(
        &self,
        document_text: &str,
        asked: &[String],
    ) -> Result<Vec<String>, LlmError> {
        let document = truncate_to_chars(document_text, self.max_document_chars);
        let prompt = format!(
            "Please provide three concise follow-up questions that can be answered by the \
paper {document}. These questions should be distinct from previously asked questions: {}. \
Yet they may be similar in nature to following questions such as: \"What is the goal of this \
paper?\", \"What are the key results of this paper?\", \"What methods are used in this \
paper?\"\n\
In your response, list only the three questions one-by-one (like 1. 2. 3.), separated by \
line break, nothing else!",
            asked.join(", ")
        );
        let reply = self.bridge.ask(vec![ChatMessage::user(prompt)]).await?;
        Ok(parse_questions(&reply))
    }
}

/// Split the strict "1. 2. 3." format into bare questions.
pub fn parse_questions(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| ORDINAL_PREFIX.replace(line.trim(), "").to_string())
        .filter(|line| !line.trim().is_empty())
        .collect()
}
