//! Turn state machine.
//!
//! One conversation turn is sequenced by a pure transition function:
//! `(state, event) -> effects`. Effects are asynchronous tasks the driver
//! executes; each completion posts an event back into the machine. This keeps
//! the ordering explicit instead of spreading it across chained callbacks.
//!
//! ```text
//! Idle -> Classifying -> (ChitchatGenerating | Retrieving)
//!      -> ResponseGenerating -> Persisting -> Idle
//! ```
//! with `Failed` reachable from every step.

use tracing::warn;

use crate::classifier::Classification;
use crate::context::PreparedContext;

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Classifying,
    Retrieving,
    ChitchatGenerating,
    ResponseGenerating,
    Persisting,
    Failed,
}

impl TurnState {
    /// User-facing progress label, if the state has one.
    pub fn progress_label(&self) -> Option<&'static str> {
        match self {
            TurnState::Classifying => Some("processing user query"),
            TurnState::Retrieving => Some("retrieving context"),
            TurnState::ChitchatGenerating | TurnState::ResponseGenerating => {
                Some("generating response")
            }
            _ => None,
        }
    }

    /// Whether the turn has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Idle | TurnState::Failed)
    }
}

/// Completion of an asynchronous step, posted back into the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Submitted,
    Classified(Classification),
    ClassificationFailed,
    ContextAssembled(PreparedContext),
    RetrievalFailed,
    Drafted(String),
    SynthesisFailed,
    Persisted,
    PersistFailed,
}

/// Asynchronous work requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEffect {
    /// Run the query classifier on the submitted text.
    Classify,
    /// Retrieve and assemble grounding context for a keyword query.
    Retrieve { query: String },
    /// Generate an ungrounded answer from history alone.
    GenerateChitchat,
    /// Generate a grounded answer from the given context.
    GenerateGrounded { context: PreparedContext },
    /// Reconcile citations as needed and write the completed turn.
    Persist { draft: String },
    /// Surface the failure as a system notice and end the turn.
    Fail,
}

/// Per-turn state machine.
///
/// Holds the data the driver needs to finalize the turn: the keyword query
/// that fed retrieval and the context the answer was grounded on.
#[derive(Debug, Clone)]
pub struct TurnMachine {
    state: TurnState,
    cached_context: Option<PreparedContext>,
    active_context: Option<PreparedContext>,
    concept: Option<String>,
}

impl TurnMachine {
    /// Start a turn. `cached_context` is the conversation's previously
    /// prepared context, reused when the turn classifies as a follow-up.
    pub fn new(cached_context: Option<PreparedContext>) -> Self {
        Self {
            state: TurnState::Idle,
            cached_context,
            active_context: None,
            concept: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The keyword query this turn retrieved with, if any.
    pub fn concept(&self) -> Option<&str> {
        self.concept.as_deref()
    }

    /// The context the answer is grounded on, if any.
    pub fn context(&self) -> Option<&PreparedContext> {
        self.active_context.as_ref()
    }

    pub fn is_grounded(&self) -> bool {
        self.active_context.is_some()
    }

    /// Advance the machine. Returns the effects the driver must execute.
    pub fn handle(&mut self, event: TurnEvent) -> Vec<TurnEffect> {
        match (self.state, event) {
            (TurnState::Idle, TurnEvent::Submitted) => {
                self.state = TurnState::Classifying;
                vec![TurnEffect::Classify]
            }

            (TurnState::Classifying, TurnEvent::Classified(Classification::ChitChat)) => {
                self.state = TurnState::ChitchatGenerating;
                vec![TurnEffect::GenerateChitchat]
            }
            (TurnState::Classifying, TurnEvent::Classified(Classification::FollowUp)) => {
                match self.cached_context.take() {
                    // Prior context exists: answer from it directly.
                    Some(context) => {
                        self.active_context = Some(context.clone());
                        self.state = TurnState::ResponseGenerating;
                        vec![TurnEffect::GenerateGrounded { context }]
                    }
                    // Nothing to follow up on: degrade to chit-chat.
                    None => {
                        self.state = TurnState::ChitchatGenerating;
                        vec![TurnEffect::GenerateChitchat]
                    }
                }
            }
            (TurnState::Classifying, TurnEvent::Classified(Classification::Search(query))) => {
                self.concept = Some(query.clone());
                self.state = TurnState::Retrieving;
                vec![TurnEffect::Retrieve { query }]
            }
            (TurnState::Classifying, TurnEvent::ClassificationFailed) => self.fail(),

            (TurnState::Retrieving, TurnEvent::ContextAssembled(context)) => {
                if context.is_empty() {
                    // Nothing retrieved: answer ungrounded.
                    self.state = TurnState::ChitchatGenerating;
                    vec![TurnEffect::GenerateChitchat]
                } else {
                    self.active_context = Some(context.clone());
                    self.state = TurnState::ResponseGenerating;
                    vec![TurnEffect::GenerateGrounded { context }]
                }
            }
            (TurnState::Retrieving, TurnEvent::RetrievalFailed) => self.fail(),

            (
                TurnState::ChitchatGenerating | TurnState::ResponseGenerating,
                TurnEvent::Drafted(draft),
            ) => {
                self.state = TurnState::Persisting;
                vec![TurnEffect::Persist { draft }]
            }
            (
                TurnState::ChitchatGenerating | TurnState::ResponseGenerating,
                TurnEvent::SynthesisFailed,
            ) => self.fail(),

            (TurnState::Persisting, TurnEvent::Persisted) => {
                self.state = TurnState::Idle;
                vec![]
            }
            (TurnState::Persisting, TurnEvent::PersistFailed) => self.fail(),

            (state, event) => {
                warn!(?state, ?event, "Ignoring event not valid in this state");
                vec![]
            }
        }
    }

    fn fail(&mut self) -> Vec<TurnEffect> {
        self.state = TurnState::Failed;
        vec![TurnEffect::Fail]
    }
}
