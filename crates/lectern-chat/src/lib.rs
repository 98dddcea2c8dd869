//! Dialogue layer for Lectern.
//!
//! Classifies each message (correction, continuation, model, patterns),
//! keeps per-conversation state, and drives the action orchestrator one
//! serialized turn at a time.

pub mod classifier;
pub mod error;
pub mod eviction;
pub mod history;
pub mod llm;
pub mod orchestrator;
pub mod store;

pub use classifier::{ClassifierChain, ClassifierInput};
pub use error::{ChatError, StoreError};
pub use eviction::spawn_eviction_task;
pub use history::{HistoryStore, SqliteHistoryStore};
pub use llm::{HttpLlmClient, LlmClient, LlmError, LlmRequest, MockLlmClient};
pub use orchestrator::{ChatOrchestrator, TurnResponse};
pub use store::{Conversation, ConversationLocks, ConversationStore, InMemoryConversationStore};
