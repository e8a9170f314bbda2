//! LLM-backed intent classification.
//!
//! One gateway call with a fixed instruction that forces one of three output
//! shapes: a short keyword query, the literal tag `chit-chat`, or the literal
//! tag `follow-up`. The tag is trusted verbatim after trimming whitespace and
//! quote characters; the literal `No Answer Found` is a terminal
//! classification failure.

use tracing::debug;

use scholia_llm::ChatMessage;

use crate::bridge::GatewayBridge;
use crate::error::ChatError;

/// Literal the model returns when it cannot classify the input.
pub const NO_ANSWER: &str = "No Answer Found";

const CHIT_CHAT_TAG: &str = "chit-chat";
const FOLLOW_UP_TAG: &str = "follow-up";

/// Outcome of classifying a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Retrieval is needed; run this keyword query.
    Search(String),
    /// Conversational turn, no retrieval.
    ChitChat,
    /// Refers to previously retrieved context.
    FollowUp,
}

/// Classifies user turns with a single gateway call.
#[derive(Clone)]
pub struct QueryClassifier {
    bridge: GatewayBridge,
}

impl QueryClassifier {
    pub fn new(bridge: GatewayBridge) -> Self {
        Self { bridge }
    }

    /// Classify a new user message, using no other state.
    pub async fn classify(&self, text: &str) -> Result<Classification, ChatError> {
        let prompt = classification_prompt(text);
        let reply = self
            .bridge
            .ask(vec![ChatMessage::user(prompt)])
            .await
            .map_err(|e| match e {
                scholia_llm::LlmError::MissingApiKey => ChatError::MissingApiKey,
                other => ChatError::Classification(other.to_string()),
            })?;

        let tag = normalize(&reply);
        debug!(tag = %tag, "Query classified");

        if tag == NO_ANSWER {
            return Err(ChatError::Classification(format!(
                "classifier returned '{}'",
                NO_ANSWER
            )));
        }
        Ok(match tag.as_str() {
            CHIT_CHAT_TAG => Classification::ChitChat,
            FOLLOW_UP_TAG => Classification::FollowUp,
            _ => Classification::Search(tag),
        })
    }
}

/// Strip surrounding whitespace and quote characters from the model output.
fn normalize(reply: &str) -> String {
    reply
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn classification_prompt(question: &str) -> String {
    format!(
        "A user has submitted a new query to a database that includes scientific research \
papers: {question}\n\
Based on this input, please provide a succinct and relevant search query, specifically \
optimized for keyword-based semantic search within a research paper database. The response \
should consist only of the query, formulated as a set of keywords rather than a complete \
sentence. For instance, if the user's input is 'What is attention?' or 'Tell me about \
attention', respond with 'attention' as the search query. Avoid using longer phrases like \
'Give me papers about attention'. Also do not include the terms 'definition', 'concepts', \
'mechanisms', 'approach', 'fundamentals', 'basics', 'techniques', 'applications', 'overview' \
or similar in the search terms. Keep the query straightforward. Refrain from using quotation \
marks at the beginning and end of the query. The search query should not exceed 5 words and \
should not include terms like 'paper' or 'research', as the database exclusively contains \
research papers.\n\
In case the user input is chit-chat related, like 'Hello', 'What can you do for me?', 'What \
is your purpose?', 'What is your name?', 'What can you help me with?', or similar, do not \
provide a search query. Instead, reply with: 'chit-chat'\n\
In case the user input is a follow-up question related to the previous chat, like 'Tell me \
more', 'Explain the second paper', or 'Tell me more about the third paper', do not provide a \
new search query. Instead, reply with: 'follow-up'"
    )
}
