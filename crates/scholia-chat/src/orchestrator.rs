//! Turn orchestration.
//!
//! [`ChatService`] is the composition root of the pipeline: it owns the
//! injected gateways and the store adapter, drives the [`TurnMachine`] for
//! each submitted message, and enforces the concurrency discipline: one
//! turn in flight per conversation, and results applied only while their
//! conversation is still the active one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use scholia_core::config::ChatConfig;
use scholia_core::{Conversation, ConversationKind, Message, Sender};
use scholia_llm::{ChatMessage, LlmError, LlmGateway};
use scholia_retrieval::{PaperSource, RetrievalFilters};
use scholia_storage::{ConversationStore, Conversations};

use crate::bridge::GatewayBridge;
use crate::citations::reconcile;
use crate::classifier::QueryClassifier;
use crate::context::{ContextAssembler, PreparedContext};
use crate::error::ChatError;
use crate::state::{TurnEffect, TurnEvent, TurnMachine};
use crate::synthesizer::ResponseSynthesizer;

/// Notice appended when the model API key is missing or invalid.
pub const NOTICE_INVALID_KEY: &str =
    "Please provide a valid API key in your profile to use this feature.";

/// Notice appended when classification, retrieval, or synthesis fails.
pub const NOTICE_UNABLE_TO_RESPOND: &str = "Unable to generate a response";

/// Result of one submitted turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The turn completed and was persisted.
    Completed {
        conversation: Conversation,
        reply: Message,
    },
    /// The turn failed; the notice belongs in the conversation view but is
    /// not persisted.
    Failed {
        conversation_id: String,
        notice: Message,
    },
    /// The user navigated away mid-turn; the result was dropped unapplied.
    Discarded,
}

/// Orchestrates conversation turns over the corpus.
pub struct ChatService {
    bridge: GatewayBridge,
    classifier: QueryClassifier,
    assembler: ContextAssembler,
    synthesizer: ResponseSynthesizer,
    papers: Arc<dyn PaperSource>,
    store: Conversations,
    filters: RetrievalFilters,
    max_papers: usize,
    /// The conversation currently shown to the user; stale results for any
    /// other conversation are discarded.
    active: Mutex<Option<String>>,
    /// Conversations with a turn in flight.
    in_flight: Mutex<HashSet<String>>,
    /// Prepared context per conversation, reused by follow-up turns.
    contexts: Mutex<HashMap<String, PreparedContext>>,
}

impl ChatService {
    pub fn new(
        llm: Arc<dyn LlmGateway>,
        papers: Arc<dyn PaperSource>,
        store: Arc<dyn ConversationStore>,
        config: ChatConfig,
        filters: RetrievalFilters,
    ) -> Self {
        let bridge = GatewayBridge::new(llm);
        Self {
            classifier: QueryClassifier::new(bridge.clone()),
            assembler: ContextAssembler::new(&config),
            synthesizer: ResponseSynthesizer::new(bridge.clone(), &config),
            bridge,
            papers,
            store: Conversations::new(store),
            filters,
            max_papers: config.max_papers,
            active: Mutex::new(None),
            in_flight: Mutex::new(HashSet::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Mark a conversation as the one the user is looking at. In-flight
    /// results for any other conversation will be discarded on completion.
    pub fn select_conversation(&self, id: Option<&str>) {
        match self.active.lock() {
            Ok(mut active) => *active = id.map(str::to_string),
            Err(e) => error!("active-conversation lock poisoned: {}", e),
        }
    }

    /// Submit a user message, driving one full turn.
    ///
    /// With no conversation id a new general conversation is created, named
    /// after the message. The user message is persisted up front; the answer
    /// is persisted only when the turn completes.
    pub async fn submit(
        &self,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let question = text.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let user_message = Message::user(question);

        let (conversation, _guard) = match conversation_id {
            Some(id) => {
                let guard = self.claim(id)?;
                let existing = self
                    .store
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| ChatError::ConversationNotFound(id.to_string()))?;
                let mut messages = existing.messages;
                messages.push(user_message);
                let updated = self
                    .store
                    .update(&existing.id, existing.kind, existing.name, messages)
                    .await?;
                (updated, guard)
            }
            None => {
                let created = self
                    .store
                    .create(ConversationKind::General, question, vec![user_message])
                    .await?;
                let guard = self.claim(&created.id)?;
                (created, guard)
            }
        };

        self.select_conversation(Some(&conversation.id));
        info!(conversation = %conversation.id, "Turn started");
        self.run_turn(&conversation, question).await
    }

    /// All conversations of the user, most recent first.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.store.list().await?)
    }

    pub async fn conversation(&self, id: &str) -> Result<Option<Conversation>, ChatError> {
        Ok(self.store.find_by_id(id).await?)
    }

    /// Delete a conversation on explicit user request.
    pub async fn delete_conversation(&self, id: &str) -> Result<(), ChatError> {
        self.store.delete(id).await?;
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.remove(id);
        }
        if let Ok(mut active) = self.active.lock() {
            if active.as_deref() == Some(id) {
                *active = None;
            }
        }
        Ok(())
    }

    /// Produce a Markdown summary of a conversation's history.
    pub async fn summarize(&self, conversation_id: &str) -> Result<String, ChatError> {
        let conversation = self
            .store
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;

        let joined = conversation
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("###########");
        let prompt = format!(
            "Provide a detailed summary of the following chat history in Markdown format. \
Messages are separated by '###########', beginning with the user's initial prompt. Respond \
only with the summary, using appropriate headers.\n{joined}"
        );

        self.bridge
            .ask_with(vec![ChatMessage::user(prompt)], Some(4000))
            .await
            .map_err(|e| match e {
                LlmError::MissingApiKey => ChatError::MissingApiKey,
                other => ChatError::Synthesis(other.to_string()),
            })
    }

    // -- Turn driving --

    async fn run_turn(
        &self,
        conversation: &Conversation,
        question: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let id = conversation.id.as_str();
        // Everything before the optimistically appended user message.
        let prior = &conversation.messages[..conversation.messages.len().saturating_sub(1)];

        let mut machine = TurnMachine::new(self.cached_context(id));
        let mut failure = NOTICE_UNABLE_TO_RESPOND;
        let mut queue: VecDeque<TurnEffect> = machine.handle(TurnEvent::Submitted).into();

        while let Some(effect) = queue.pop_front() {
            let event = match effect {
                TurnEffect::Classify => match self.classifier.classify(question).await {
                    Ok(classification) => TurnEvent::Classified(classification),
                    Err(e) => {
                        warn!(conversation = %id, error = %e, "Classification failed");
                        failure = notice_for(&e);
                        TurnEvent::ClassificationFailed
                    }
                },
                TurnEffect::Retrieve { query } => {
                    match self
                        .papers
                        .retrieve(&query, &self.filters, self.max_papers)
                        .await
                    {
                        Ok(papers) => TurnEvent::ContextAssembled(self.assembler.assemble(&papers)),
                        Err(e) => {
                            warn!(conversation = %id, error = %e, "Retrieval failed");
                            TurnEvent::RetrievalFailed
                        }
                    }
                }
                TurnEffect::GenerateChitchat => {
                    match self.synthesizer.chitchat(prior, question).await {
                        Ok(draft) => TurnEvent::Drafted(draft),
                        Err(e) => {
                            warn!(conversation = %id, error = %e, "Chit-chat generation failed");
                            failure = notice_for_llm(&e);
                            TurnEvent::SynthesisFailed
                        }
                    }
                }
                TurnEffect::GenerateGrounded { context } => {
                    match self.synthesizer.grounded(prior, question, &context).await {
                        Ok(draft) => TurnEvent::Drafted(draft),
                        Err(e) => {
                            warn!(conversation = %id, error = %e, "Grounded generation failed");
                            failure = notice_for_llm(&e);
                            TurnEvent::SynthesisFailed
                        }
                    }
                }
                TurnEffect::Persist { draft } => {
                    if !self.is_active(id) {
                        info!(conversation = %id, "Discarding stale result");
                        return Ok(TurnOutcome::Discarded);
                    }
                    let reply = self.build_reply(&machine, draft);
                    let mut messages = conversation.messages.clone();
                    messages.push(reply.clone());
                    match self
                        .store
                        .update(
                            id,
                            conversation.kind.clone(),
                            conversation.name.clone(),
                            messages,
                        )
                        .await
                    {
                        Ok(updated) => {
                            if let Some(context) = machine.context() {
                                self.cache_context(id, context.clone());
                            }
                            info!(
                                conversation = %id,
                                grounded = machine.is_grounded(),
                                "Turn completed"
                            );
                            return Ok(TurnOutcome::Completed {
                                conversation: updated,
                                reply,
                            });
                        }
                        Err(e) => {
                            error!(conversation = %id, error = %e, "Persisting turn failed");
                            TurnEvent::PersistFailed
                        }
                    }
                }
                TurnEffect::Fail => {
                    if !self.is_active(id) {
                        info!(conversation = %id, "Discarding stale failure");
                        return Ok(TurnOutcome::Discarded);
                    }
                    return Ok(TurnOutcome::Failed {
                        conversation_id: id.to_string(),
                        notice: Message::system(failure),
                    });
                }
            };
            queue.extend(machine.handle(event));
        }

        Err(ChatError::Synthesis(
            "turn ended without producing a result".to_string(),
        ))
    }

    /// Build the bot message for a draft, reconciling citations when the
    /// answer was grounded.
    fn build_reply(&self, machine: &TurnMachine, draft: String) -> Message {
        match machine.context() {
            Some(context) => {
                let adjusted = reconcile(&draft, &context.blocks, &context.titles, &context.ids);
                Message {
                    text: adjusted.text,
                    sender: Sender::Bot,
                    concept: machine.concept().map(str::to_string),
                    publication_ids: adjusted.ids,
                    publication_titles: adjusted.titles,
                    publications: adjusted.publications,
                }
            }
            None => Message::bot(draft),
        }
    }

    // -- Shared-state helpers --

    fn claim(&self, id: &str) -> Result<FlightGuard<'_>, ChatError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|e| ChatError::Storage(format!("in-flight lock poisoned: {}", e)))?;
        if !in_flight.insert(id.to_string()) {
            return Err(ChatError::TurnInProgress(id.to_string()));
        }
        Ok(FlightGuard {
            service: self,
            id: id.to_string(),
        })
    }

    fn is_active(&self, id: &str) -> bool {
        match self.active.lock() {
            Ok(active) => active.as_deref() == Some(id),
            Err(e) => {
                error!("active-conversation lock poisoned: {}", e);
                false
            }
        }
    }

    fn cached_context(&self, id: &str) -> Option<PreparedContext> {
        self.contexts.lock().ok().and_then(|c| c.get(id).cloned())
    }

    fn cache_context(&self, id: &str, context: PreparedContext) {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.insert(id.to_string(), context);
        }
    }
}

fn notice_for(err: &ChatError) -> &'static str {
    match err {
        ChatError::MissingApiKey => NOTICE_INVALID_KEY,
        _ => NOTICE_UNABLE_TO_RESPOND,
    }
}

fn notice_for_llm(err: &LlmError) -> &'static str {
    match err {
        LlmError::MissingApiKey => NOTICE_INVALID_KEY,
        _ => NOTICE_UNABLE_TO_RESPOND,
    }
}

/// Releases the single-flight claim when the turn ends, however it ends.
struct FlightGuard<'a> {
    service: &'a ChatService,
    id: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.service.in_flight.lock() {
            in_flight.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholia_core::RetrievedPaper;
    use scholia_llm::CompletionRequest;
    use scholia_retrieval::RetrievalError;
    use scholia_storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ---- Mock collaborators ----

    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(vec![]),
            })
        }

        fn replying(replies: &[&str]) -> Arc<Self> {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }
    }

    #[async_trait::async_trait]
    impl LlmGateway for ScriptedGateway {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    struct GatedGateway {
        entered: tokio::sync::Notify,
        gate: tokio::sync::Semaphore,
        replies: Mutex<VecDeque<String>>,
    }

    impl GatedGateway {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                entered: tokio::sync::Notify::new(),
                gate: tokio::sync::Semaphore::new(0),
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmGateway for GatedGateway {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await.expect("gate closed");
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "fallback".to_string()))
        }
    }

    struct StaticPapers {
        papers: Vec<RetrievedPaper>,
        calls: AtomicUsize,
    }

    impl StaticPapers {
        fn with(papers: Vec<RetrievedPaper>) -> Arc<Self> {
            Arc::new(Self {
                papers,
                calls: AtomicUsize::new(0),
            })
        }

        fn empty() -> Arc<Self> {
            Self::with(vec![])
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl PaperSource for StaticPapers {
        async fn retrieve(
            &self,
            _query: &str,
            _filters: &RetrievalFilters,
            limit: usize,
        ) -> Result<Vec<RetrievedPaper>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.papers.iter().take(limit).cloned().collect())
        }
    }

    struct FailingPapers;

    #[async_trait::async_trait]
    impl PaperSource for FailingPapers {
        async fn retrieve(
            &self,
            _query: &str,
            _filters: &RetrievalFilters,
            _limit: usize,
        ) -> Result<Vec<RetrievedPaper>, RetrievalError> {
            Err(RetrievalError::KnowledgeGraph("backend down".to_string()))
        }
    }

    fn paper(id: &str, title: &str) -> RetrievedPaper {
        RetrievedPaper {
            id: id.to_string(),
            title: title.to_string(),
            full_text: Some(format!("{title} body text")),
        }
    }

    fn service(llm: Arc<dyn LlmGateway>, papers: Arc<dyn PaperSource>) -> ChatService {
        ChatService::new(
            llm,
            papers,
            Arc::new(MemoryStore::new()),
            ChatConfig::default(),
            RetrievalFilters::default(),
        )
    }

    fn completed(outcome: TurnOutcome) -> (Conversation, Message) {
        match outcome {
            TurnOutcome::Completed {
                conversation,
                reply,
            } => (conversation, reply),
            other => panic!("expected completed turn, got {:?}", other),
        }
    }

    // ---- Input validation ----

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let service = service(ScriptedGateway::replying(&[]), StaticPapers::empty());
        let result = service.submit(None, "   ").await;
        assert!(matches!(result.unwrap_err(), ChatError::EmptyMessage));
    }

    #[tokio::test]
    async fn test_unknown_conversation_rejected() {
        let service = service(ScriptedGateway::replying(&[]), StaticPapers::empty());
        let result = service.submit(Some("nope"), "hello").await;
        assert!(matches!(
            result.unwrap_err(),
            ChatError::ConversationNotFound(_)
        ));
    }

    // ---- Grounded turn (scenario: unused citation renumbered) ----

    #[tokio::test]
    async fn test_grounded_turn_renumbers_citations() {
        let gateway = ScriptedGateway::replying(&[
            "attention mechanisms",
            "Attention weighs tokens [1]. Transformers build on it [3].",
        ]);
        let papers = StaticPapers::with(vec![
            paper("p1", "First"),
            paper("p2", "Second"),
            paper("p3", "Third"),
        ]);
        let service = service(gateway, papers.clone());

        let outcome = service.submit(None, "What is attention?").await.unwrap();
        let (conversation, reply) = completed(outcome);

        assert_eq!(papers.call_count(), 1);
        assert_eq!(
            reply.text,
            "Attention weighs tokens [1]. Transformers build on it [2]."
        );
        assert_eq!(reply.publications.len(), 2);
        assert_eq!(reply.publication_ids, vec!["p1", "p3"]);
        assert_eq!(reply.publication_titles, vec!["First", "Third"]);
        assert_eq!(reply.concept.as_deref(), Some("attention mechanisms"));

        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].sender, Sender::User);
        assert_eq!(conversation.messages[1], reply);
        assert_eq!(conversation.name, "What is attention?");
        assert_eq!(conversation.kind, ConversationKind::General);
    }

    // ---- Chit-chat turn (scenario: no retrieval) ----

    #[tokio::test]
    async fn test_chitchat_turn_skips_retrieval() {
        let gateway = ScriptedGateway::replying(&["chit-chat", "Hello! How can I help?"]);
        let papers = StaticPapers::with(vec![paper("p1", "First")]);
        let service = service(gateway, papers.clone());

        let outcome = service.submit(None, "Hello").await.unwrap();
        let (_, reply) = completed(outcome);

        assert_eq!(papers.call_count(), 0);
        assert_eq!(reply.text, "Hello! How can I help?");
        assert!(reply.publications.is_empty());
        assert!(reply.publication_ids.is_empty());
        assert!(reply.concept.is_none());
    }

    // ---- Classification failure (scenario: No Answer Found) ----

    #[tokio::test]
    async fn test_no_answer_found_fails_turn() {
        let gateway = ScriptedGateway::replying(&["No Answer Found"]);
        let service = service(gateway, StaticPapers::empty());

        let outcome = service.submit(None, "???").await.unwrap();
        let TurnOutcome::Failed {
            conversation_id,
            notice,
        } = outcome
        else {
            panic!("expected failed turn");
        };
        assert_eq!(notice.sender, Sender::System);
        assert_eq!(notice.text, NOTICE_UNABLE_TO_RESPOND);

        // Only the optimistic user message was persisted; no notice, no answer.
        let stored = service.conversation(&conversation_id).await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].sender, Sender::User);
    }

    // ---- History pruning across turns (scenario 4) ----

    #[tokio::test]
    async fn test_older_turns_lose_publications_payload() {
        let gateway = ScriptedGateway::replying(&[
            "attention",
            "First answer [1].",
            "transformers",
            "Second answer [1].",
        ]);
        let papers = StaticPapers::with(vec![paper("p1", "First")]);
        let service = service(gateway, papers);

        let (conversation, _) =
            completed(service.submit(None, "What is attention?").await.unwrap());
        let (conversation, reply) = completed(
            service
                .submit(Some(&conversation.id), "And transformers?")
                .await
                .unwrap(),
        );

        assert_eq!(conversation.messages.len(), 4);
        // The older grounded answer keeps ids/titles but loses full blocks.
        let older = &conversation.messages[1];
        assert!(older.publications.is_empty());
        assert_eq!(older.publication_ids.len(), 1);
        assert_eq!(older.publication_titles.len(), 1);
        // The newest answer retains its full payload.
        assert_eq!(reply.publications.len(), 1);
        assert_eq!(conversation.messages[3].publications.len(), 1);
    }

    // ---- Follow-up behavior ----

    #[tokio::test]
    async fn test_follow_up_reuses_cached_context() {
        let gateway = ScriptedGateway::replying(&[
            "attention",
            "Grounded [1].",
            "follow-up",
            "More detail [1].",
        ]);
        let papers = StaticPapers::with(vec![paper("p1", "First")]);
        let service = service(gateway, papers.clone());

        let (conversation, _) =
            completed(service.submit(None, "What is attention?").await.unwrap());
        let (_, reply) = completed(
            service
                .submit(Some(&conversation.id), "Tell me more")
                .await
                .unwrap(),
        );

        // One retrieval total: the follow-up reused the prepared context.
        assert_eq!(papers.call_count(), 1);
        assert_eq!(reply.publication_ids, vec!["p1"]);
        assert!(reply.concept.is_none());
    }

    #[tokio::test]
    async fn test_follow_up_without_context_degrades_to_chitchat() {
        let gateway = ScriptedGateway::replying(&["follow-up", "Nothing to expand on yet."]);
        let papers = StaticPapers::with(vec![paper("p1", "First")]);
        let service = service(gateway, papers.clone());

        let (_, reply) = completed(service.submit(None, "Tell me more").await.unwrap());
        assert_eq!(papers.call_count(), 0);
        assert!(reply.publication_ids.is_empty());
    }

    // ---- Empty retrieval falls back to ungrounded generation ----

    #[tokio::test]
    async fn test_empty_retrieval_falls_back_to_chitchat() {
        let gateway = ScriptedGateway::replying(&["obscure topic", "Plain answer."]);
        let papers = StaticPapers::empty();
        let service = service(gateway, papers.clone());

        let (_, reply) = completed(service.submit(None, "Tell me about it").await.unwrap());
        assert_eq!(papers.call_count(), 1);
        assert_eq!(reply.text, "Plain answer.");
        assert!(reply.publications.is_empty());
    }

    // ---- Failure notices ----

    #[tokio::test]
    async fn test_missing_key_notice() {
        let gateway = ScriptedGateway::new(vec![Err(LlmError::MissingApiKey)]);
        let service = service(gateway, StaticPapers::empty());

        let outcome = service.submit(None, "What is attention?").await.unwrap();
        let TurnOutcome::Failed { notice, .. } = outcome else {
            panic!("expected failed turn");
        };
        assert_eq!(notice.text, NOTICE_INVALID_KEY);
    }

    #[tokio::test]
    async fn test_retrieval_failure_notice() {
        let gateway = ScriptedGateway::replying(&["attention"]);
        let service = service(gateway, Arc::new(FailingPapers));

        let outcome = service.submit(None, "What is attention?").await.unwrap();
        let TurnOutcome::Failed {
            conversation_id,
            notice,
        } = outcome
        else {
            panic!("expected failed turn");
        };
        assert_eq!(notice.text, NOTICE_UNABLE_TO_RESPOND);

        let stored = service.conversation(&conversation_id).await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure_notice() {
        let gateway = ScriptedGateway::new(vec![
            Ok("chit-chat".to_string()),
            Err(LlmError::Api {
                status: 500,
                message: "overloaded".to_string(),
            }),
        ]);
        let service = service(gateway, StaticPapers::empty());

        let outcome = service.submit(None, "Hello").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed { ref notice, .. }
            if notice.text == NOTICE_UNABLE_TO_RESPOND));
    }

    // ---- Concurrency discipline ----

    #[tokio::test]
    async fn test_single_flight_per_conversation() {
        let store = Arc::new(MemoryStore::new());
        let seeded = store
            .create(ConversationKind::General, "seeded".to_string(), vec![])
            .await
            .unwrap();

        let gateway = GatedGateway::new(&["chit-chat", "hello there"]);
        let service = Arc::new(ChatService::new(
            gateway.clone(),
            StaticPapers::empty(),
            store,
            ChatConfig::default(),
            RetrievalFilters::default(),
        ));

        let first = {
            let service = service.clone();
            let id = seeded.id.clone();
            tokio::spawn(async move { service.submit(Some(&id), "first question").await })
        };
        // Wait until the first turn is inside the classifier call.
        gateway.entered.notified().await;

        let second = service.submit(Some(&seeded.id), "second question").await;
        assert!(matches!(
            second.unwrap_err(),
            ChatError::TurnInProgress(_)
        ));

        gateway.gate.add_permits(8);
        let outcome = first.await.unwrap().unwrap();
        let (conversation, _) = completed(outcome);
        // The rejected submission never touched the conversation.
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].text, "first question");
    }

    #[tokio::test]
    async fn test_stale_result_discarded() {
        let gateway = GatedGateway::new(&["chit-chat", "too late"]);
        let service = Arc::new(service(gateway.clone(), StaticPapers::empty()));

        let turn = {
            let service = service.clone();
            tokio::spawn(async move { service.submit(None, "first question").await })
        };
        gateway.entered.notified().await;

        // The user navigates away while the turn is still classifying.
        service.select_conversation(None);
        gateway.gate.add_permits(8);

        let outcome = turn.await.unwrap().unwrap();
        assert_eq!(outcome, TurnOutcome::Discarded);

        // Only the optimistic user message reached the store.
        let conversations = service.conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_turns_on_different_conversations_overlap() {
        let store = Arc::new(MemoryStore::new());
        let a = store
            .create(ConversationKind::General, "a".to_string(), vec![])
            .await
            .unwrap();

        let gateway = GatedGateway::new(&["chit-chat", "chit-chat", "answer a", "answer b"]);
        let service = Arc::new(ChatService::new(
            gateway.clone(),
            StaticPapers::empty(),
            store.clone(),
            ChatConfig::default(),
            RetrievalFilters::default(),
        ));

        let first = {
            let service = service.clone();
            let id = a.id.clone();
            tokio::spawn(async move { service.submit(Some(&id), "question a").await })
        };
        gateway.entered.notified().await;

        // A second conversation can start while the first is suspended.
        let b = store
            .create(ConversationKind::General, "b".to_string(), vec![])
            .await
            .unwrap();
        let second = {
            let service = service.clone();
            let id = b.id.clone();
            tokio::spawn(async move { service.submit(Some(&id), "question b").await })
        };

        gateway.gate.add_permits(16);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        // The later submission selected its conversation, so the earlier one
        // resolves as stale; the later one completes.
        assert!(matches!(second, TurnOutcome::Completed { .. }));
        assert!(matches!(
            first,
            TurnOutcome::Completed { .. } | TurnOutcome::Discarded
        ));
    }

    // ---- Conversation management ----

    #[tokio::test]
    async fn test_delete_conversation_clears_caches() {
        let gateway = ScriptedGateway::replying(&["attention", "Grounded [1]."]);
        let papers = StaticPapers::with(vec![paper("p1", "First")]);
        let service = service(gateway, papers);

        let (conversation, _) =
            completed(service.submit(None, "What is attention?").await.unwrap());
        service.delete_conversation(&conversation.id).await.unwrap();

        assert!(service
            .conversation(&conversation.id)
            .await
            .unwrap()
            .is_none());
        assert!(service.cached_context(&conversation.id).is_none());
        assert!(!service.is_active(&conversation.id));
    }

    // ---- Summary ----

    #[tokio::test]
    async fn test_summarize_joins_history() {
        let gateway = ScriptedGateway::replying(&["chit-chat", "Hi!", "## Summary\ndetails"]);
        let service = service(gateway.clone(), StaticPapers::empty());

        let (conversation, _) = completed(service.submit(None, "Hello").await.unwrap());
        let summary = service.summarize(&conversation.id).await.unwrap();
        assert_eq!(summary, "## Summary\ndetails");

        let requests = gateway.requests.lock().unwrap();
        let request = requests.last().unwrap();
        assert_eq!(request.max_tokens, Some(4000));
        let prompt = &request.messages[1].content;
        assert!(prompt.contains("###########"));
        assert!(prompt.contains("Hello"));
        assert!(prompt.contains("Hi!"));
    }

    #[tokio::test]
    async fn test_summarize_unknown_conversation() {
        let service = service(ScriptedGateway::replying(&[]), StaticPapers::empty());
        let result = service.summarize("nope").await;
        assert!(matches!(
            result.unwrap_err(),
            ChatError::ConversationNotFound(_)
        ));
    }
}
