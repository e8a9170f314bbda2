//! Conversational retrieval-augmented chat over a scientific-paper corpus.
//!
//! Turns a free-text question into a retrieval query, fetches candidate
//! papers, and asks a language model to answer using only those papers, with
//! inline citations traceable back to specific sources. Conversation state is
//! persisted compactly after every completed turn.

pub mod bridge;
pub mod citations;
pub mod classifier;
pub mod context;
pub mod error;
pub mod followup;
pub mod orchestrator;
pub mod paper;
pub mod state;
pub mod synthesizer;

pub use bridge::GatewayBridge;
pub use citations::{reconcile, CitedAnswer};
pub use classifier::{Classification, QueryClassifier};
pub use context::{history_window, truncate_to_chars, ContextAssembler, PreparedContext};
pub use error::ChatError;
pub use followup::FollowUpGenerator;
pub use orchestrator::{ChatService, TurnOutcome, NOTICE_INVALID_KEY, NOTICE_UNABLE_TO_RESPOND};
pub use paper::{PaperChat, PaperDocument, PaperOutcome, PaperTurn};
pub use state::{TurnEffect, TurnEvent, TurnMachine, TurnState};
pub use synthesizer::ResponseSynthesizer;
