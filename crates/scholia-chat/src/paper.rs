//! Single-document conversations ("ask this paper").
//!
//! Context is one document's full text, truncated to the whole token budget
//! instead of a per-paper share. Each successful answer is followed by an
//! independent gateway call that suggests three fresh questions.

use std::sync::Arc;

use tracing::{info, warn};

use scholia_core::config::ChatConfig;
use scholia_core::{Conversation, ConversationKind, Message, Sender};
use scholia_llm::{ChatMessage, LlmError, LlmGateway};
use scholia_storage::{ConversationStore, Conversations};

use crate::bridge::GatewayBridge;
use crate::context::truncate_to_chars;
use crate::error::ChatError;
use crate::followup::FollowUpGenerator;
use crate::orchestrator::{NOTICE_INVALID_KEY, NOTICE_UNABLE_TO_RESPOND};

/// Reply text a model produces when the document cannot answer.
const NO_ANSWER: &str = "No Answer Found";

/// The document a paper conversation is scoped to.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperDocument {
    pub id: String,
    pub title: String,
    pub full_text: String,
}

/// A completed paper turn.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperTurn {
    pub conversation: Conversation,
    pub reply: Message,
    pub suggested_questions: Vec<String>,
}

/// Result of one paper turn.
#[derive(Debug, Clone, PartialEq)]
pub enum PaperOutcome {
    Completed(PaperTurn),
    /// The turn failed; the notice belongs in the conversation view but is
    /// not persisted.
    Failed {
        conversation_id: String,
        notice: Message,
    },
}

/// Drives single-document conversations.
pub struct PaperChat {
    bridge: GatewayBridge,
    followups: FollowUpGenerator,
    store: Conversations,
    history_turns: usize,
    max_document_chars: usize,
}

impl PaperChat {
    pub fn new(
        llm: Arc<dyn LlmGateway>,
        store: Arc<dyn ConversationStore>,
        config: ChatConfig,
    ) -> Self {
        let bridge = GatewayBridge::new(llm);
        Self {
            followups: FollowUpGenerator::new(bridge.clone(), &config),
            bridge,
            store: Conversations::new(store),
            history_turns: config.paper_history_turns,
            max_document_chars: config.max_context_tokens * config.chars_per_token,
        }
    }

    /// Answer a question about `document`, then suggest three follow-ups.
    ///
    /// With no conversation id a new document-scoped conversation is created
    /// with a model-suggested name. The user message is persisted up front;
    /// the answer only on success.
    pub async fn ask(
        &self,
        document: &PaperDocument,
        conversation_id: Option<&str>,
        question: &str,
    ) -> Result<PaperOutcome, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let user_message = Message::user(question);
        let kind = ConversationKind::Document(document.id.clone());

        let conversation = match conversation_id {
            Some(id) => {
                let existing = self
                    .store
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| ChatError::ConversationNotFound(id.to_string()))?;
                let mut messages = existing.messages;
                messages.push(user_message);
                self.store
                    .update(&existing.id, kind.clone(), existing.name, messages)
                    .await?
            }
            None => {
                let name = self.suggest_name(question, &document.title).await;
                self.store
                    .create(kind.clone(), name, vec![user_message])
                    .await?
            }
        };
        info!(conversation = %conversation.id, paper = %document.id, "Paper turn started");

        let prior = &conversation.messages[..conversation.messages.len() - 1];
        let prompt = self.answer_prompt(document, prior, question);

        let answer = match self.bridge.ask(vec![ChatMessage::user(prompt)]).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(conversation = %conversation.id, error = %e, "Paper answer failed");
                return Ok(PaperOutcome::Failed {
                    conversation_id: conversation.id,
                    notice: Message::system(match e {
                        LlmError::MissingApiKey => NOTICE_INVALID_KEY,
                        _ => NOTICE_UNABLE_TO_RESPOND,
                    }),
                });
            }
        };

        let reply = Message::bot(answer);
        let mut messages = conversation.messages.clone();
        messages.push(reply.clone());
        let conversation = self
            .store
            .update(&conversation.id, kind, conversation.name, messages)
            .await?;

        // Independent call; a failure costs only the suggestions.
        let asked: Vec<String> = conversation
            .messages
            .iter()
            .filter(|m| m.sender == Sender::User)
            .map(|m| m.text.clone())
            .collect();
        let suggested_questions = match self.followups.generate(&document.full_text, &asked).await
        {
            Ok(questions) => questions,
            Err(e) => {
                warn!(conversation = %conversation.id, error = %e, "Follow-up generation failed");
                Vec::new()
            }
        };

        Ok(PaperOutcome::Completed(PaperTurn {
            conversation,
            reply,
            suggested_questions,
        }))
    }

    /// Ask the model for a short conversation name; fall back to the
    /// question itself.
    async fn suggest_name(&self, question: &str, paper_title: &str) -> String {
        let prompt = format!(
            "suggest a name for the question: {question} asked for paper {paper_title}. The \
answer should contain only your suggestion without quotes"
        );
        match self.bridge.ask(vec![ChatMessage::user(prompt)]).await {
            Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
            Ok(_) => question.to_string(),
            Err(e) => {
                warn!(error = %e, "Name suggestion failed; using the question");
                question.to_string()
            }
        }
    }

    fn answer_prompt(&self, document: &PaperDocument, prior: &[Message], question: &str) -> String {
        let history = windowed_history(prior, self.history_turns);
        let conv_history = if history.is_empty() {
            String::new()
        } else {
            format!("\n\nThis is our conversation history:\n{}", history)
        };
        let text = truncate_to_chars(&document.full_text, self.max_document_chars);
        format!(
            "Answer the new question based on the following paper: {text}. \
If the user query is chit-chat related, answer accordingly without considering the paper and \
do not provide supporting statements. If the question is related to the paper, first answer \
the question, then in your response, create a new section on the next line titled \
'Supporting Statements'. In this section, provide the supporting statements from the paper \
that substantiate your answer. Present each statement on a separate new line, one by one, \
and include the corresponding page number at the end.{conv_history}\n\n\
This is the new question: {question}"
        )
    }
}

/// Drop failed turns (any message reading `No Answer Found` and the message
/// immediately before it), then keep the last `turns` entries, joined by
/// blank lines.
fn windowed_history(messages: &[Message], turns: usize) -> String {
    let kept: Vec<&Message> = messages
        .iter()
        .enumerate()
        .filter(|(i, m)| {
            let current_failed = m.text.trim() == NO_ANSWER;
            let next_failed = messages
                .get(i + 1)
                .map(|next| next.text.trim() == NO_ANSWER)
                .unwrap_or(false);
            !current_failed && !next_failed
        })
        .map(|(_, m)| m)
        .collect();

    let start = kept.len().saturating_sub(turns);
    kept[start..]
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
