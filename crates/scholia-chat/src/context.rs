//! Context assembly for grounded generation.
//!
//! Builds bounded-size, citation-indexed paper blocks from retrieval results
//! and windows conversation history into role/content pairs for the
//! synthesizer.

use scholia_core::config::ChatConfig;
use scholia_core::{Message, RetrievedPaper, Sender};
use scholia_llm::ChatMessage;

/// Ordered paper blocks plus the parallel id/title arrays used for citation
/// mapping. `blocks[i]` corresponds to inline marker `[i+1]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparedContext {
    pub blocks: Vec<String>,
    pub ids: Vec<String>,
    pub titles: Vec<String>,
}

impl PreparedContext {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// Builds token-budgeted paper blocks.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_context_tokens: usize,
    chars_per_token: usize,
    max_papers: usize,
}

impl ContextAssembler {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            max_context_tokens: config.max_context_tokens,
            chars_per_token: config.chars_per_token,
            max_papers: config.max_papers,
        }
    }

    /// Character budget for a single paper when *k* papers share the context
    /// window.
    pub fn paper_budget(&self, k: usize) -> usize {
        if k == 0 {
            return 0;
        }
        (self.max_context_tokens / k) * self.chars_per_token
    }

    /// Assemble ordered paper blocks from ranked retrieval results.
    ///
    /// The budget divides by the number of papers actually retrieved; full
    /// texts are hard-truncated to their share, no summarization.
    pub fn assemble(&self, papers: &[RetrievedPaper]) -> PreparedContext {
        let kept = &papers[..papers.len().min(self.max_papers)];
        if kept.is_empty() {
            return PreparedContext::default();
        }
        let budget = self.paper_budget(kept.len());

        let mut context = PreparedContext::default();
        for (i, paper) in kept.iter().enumerate() {
            let full_text = paper.full_text.as_deref().unwrap_or("");
            let truncated = truncate_to_chars(full_text, budget);
            context.blocks.push(format!(
                "Paper Number {}: {} fullText: {}",
                i + 1,
                paper.title,
                truncated
            ));
            context.ids.push(paper.id.clone());
            context.titles.push(paper.title.clone());
        }
        context
    }
}

/// Hard character cut. Multi-byte characters are never split; anything past
/// the budget is discarded.
pub fn truncate_to_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Window prior messages plus the new question into the last `turns`
/// role/content pairs.
///
/// System notices are dropped, bot messages become assistant turns, and the
/// new question is always the final element of the window.
pub fn history_window(messages: &[Message], question: &str, turns: usize) -> Vec<ChatMessage> {
    let mut window: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| matches!(m.sender, Sender::User | Sender::Bot))
        .map(|m| match m.sender {
            Sender::Bot => ChatMessage::assistant(m.text.clone()),
            _ => ChatMessage::user(m.text.clone()),
        })
        .collect();
    window.push(ChatMessage::user(question));

    let start = window.len().saturating_sub(turns);
    window.split_off(start)
}
