//! Grounded and ungrounded response generation.
//!
//! Builds the final prompt for a turn (persona, trailing history window,
//! and for grounded turns the instruction block embedding the paper
//! blocks) and invokes the gateway. Returns raw answer text; failures leave
//! the conversation untouched so the caller can attach a system notice.

use scholia_core::config::ChatConfig;
use scholia_core::Message;
use scholia_llm::LlmError;

use crate::bridge::GatewayBridge;
use crate::context::{history_window, PreparedContext};

const PAPER_SEPARATOR: &str = " ############## ";

/// Generates answers from the trailing conversation window.
#[derive(Clone)]
pub struct ResponseSynthesizer {
    bridge: GatewayBridge,
    history_turns: usize,
}

impl ResponseSynthesizer {
    pub fn new(bridge: GatewayBridge, config: &ChatConfig) -> Self {
        Self {
            bridge,
            history_turns: config.history_turns,
        }
    }

    /// Generate a grounded answer from the prepared paper context.
    ///
    /// `prior` holds the conversation before the new question.
    pub async fn grounded(
        &self,
        prior: &[Message],
        question: &str,
        context: &PreparedContext,
    ) -> Result<String, LlmError> {
        let instruction = grounded_instruction(question, context);
        let window = history_window(prior, &instruction, self.history_turns);
        self.bridge.ask(window).await
    }

    /// Generate an ungrounded chit-chat answer from history alone.
    pub async fn chitchat(&self, prior: &[Message], question: &str) -> Result<String, LlmError> {
        let window = history_window(prior, question, self.history_turns);
        self.bridge.ask(window).await
    }
}

fn grounded_instruction(question: &str, context: &PreparedContext) -> String {
    let papers = context.blocks.join(PAPER_SEPARATOR);
    format!(
        "Respond to the following user query: {question}.\n\
Use the information from the provided papers. Some papers include full texts, while others \
only have titles. Papers include position numbers like 'Paper Number 1:' and are separated by \
'##############'. Here are the papers: {papers}\n\
Your response should directly address the user query, without individually explaining each \
paper. The user should not be aware of the specific papers used in formulating your answer. \
Focus on explaining the concept rather than detailing the papers themselves. Aim for a \
response that is approximately 150 words in length. Include inline citations like [1] for the \
first paper, [2] for the second, and so on, corresponding to the order in which the papers \
were provided and the position numbers. If citing from multiple sources, list them in \
separate square brackets, like [1][2]. Cite the sentences influenced by these papers, not the \
paper names directly. Do not list the references as '[1] paper name, [2] paper name, etc.' at \
the end of your response. Cite each paper in an independent sentence and not together in the \
same sentence. Refrain from including the referenced papers in the last sentence."
    )
}
