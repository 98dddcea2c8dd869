//! Error types for the action engine.

use lectern_core::error::LecternError;
use lectern_core::intent::Intent;

use crate::backend::BackendError;
use crate::state_machine::DialogueState;

/// Errors from wiring and running action handlers.
///
/// Handler outcomes are reported as responses; these cover failures of the
/// engine itself.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("No handler registered for intent: {0}")]
    UnregisteredHandler(Intent),
    #[error("Invalid dialogue transition: {0} -> {1}")]
    InvalidTransition(DialogueState, DialogueState),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl From<ActionError> for LecternError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Backend(e) => LecternError::Backend(e.to_string()),
            other => LecternError::Api(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display() {
        let err = ActionError::UnregisteredHandler(Intent::SendEmail);
        assert_eq!(err.to_string(), "No handler registered for intent: SEND_EMAIL");

        let err = ActionError::InvalidTransition(DialogueState::Idle, DialogueState::Executing);
        assert_eq!(err.to_string(), "Invalid dialogue transition: idle -> executing");
    }

    #[test]
    fn test_action_error_from_backend_error() {
        let err: ActionError = BackendError::Timeout.into();
        assert!(matches!(err, ActionError::Backend(_)));
        let top: LecternError = err.into();
        assert!(matches!(top, LecternError::Backend(_)));
    }
}
