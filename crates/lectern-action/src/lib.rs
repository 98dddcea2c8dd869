//! Action engine for Lectern.
//!
//! Resolves entity references against live backend data and executes
//! classified intents through per-intent handlers.

pub mod backend;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod resolver;
pub mod state_machine;
pub mod types;

pub use backend::{BackendError, BackendOp, BackendService, ErrorClass, HttpBackend, InMemoryBackend};
pub use error::ActionError;
pub use handler::{ActionCall, ActionHandler, ActionRegistry};
pub use orchestrator::{ActionOrchestrator, UNAUTHORIZED_MESSAGE};
pub use resolver::{match_reply, resolve, EntityMatch};
pub use state_machine::{validate_transition, DialogueMachine, DialogueState};
pub use types::{Entity, EntityKind, FailureKind, OrchestratorResponse};
