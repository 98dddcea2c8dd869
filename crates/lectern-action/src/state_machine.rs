//! Dialogue state machine with validated transitions.
//!
//! One machine per conversation turn, seeded from the stored context:
//! Idle -> Classifying -> Disambiguating / CollectingParameter / Executing -> Idle
//! Cancel returns any state to Idle.

use std::fmt;

use lectern_core::context::Context;
use serde::Serialize;
use tracing::debug;

use crate::error::ActionError;
use crate::types::OrchestratorResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    Idle,
    Classifying,
    Disambiguating,
    CollectingParameter,
    Executing,
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogueState::Idle => write!(f, "idle"),
            DialogueState::Classifying => write!(f, "classifying"),
            DialogueState::Disambiguating => write!(f, "disambiguating"),
            DialogueState::CollectingParameter => write!(f, "collecting_parameter"),
            DialogueState::Executing => write!(f, "executing"),
        }
    }
}

impl DialogueState {
    /// State a conversation is resting in between turns.
    pub fn from_context(context: &Context) -> Self {
        if context.pending_action.is_some() {
            DialogueState::Disambiguating
        } else if context.ongoing_action.is_some() {
            DialogueState::CollectingParameter
        } else {
            DialogueState::Idle
        }
    }

    /// Resting state after an action produced `response`.
    pub fn after(response: &OrchestratorResponse) -> Self {
        match response {
            OrchestratorResponse::NeedsDisambiguation { .. } => DialogueState::Disambiguating,
            OrchestratorResponse::NeedsParameter { .. } => DialogueState::CollectingParameter,
            OrchestratorResponse::Completed { .. } | OrchestratorResponse::Failed { .. } => {
                DialogueState::Idle
            }
        }
    }
}

/// Validate that a dialogue transition is allowed.
///
/// Valid transitions:
/// - Idle -> Classifying
/// - Classifying -> Disambiguating | CollectingParameter | Executing
/// - Disambiguating -> Executing (reply picked an option)
/// - Disambiguating -> Disambiguating (re-ask)
/// - Disambiguating -> Classifying (reply was a new request)
/// - CollectingParameter -> Executing | CollectingParameter | Classifying
/// - Executing -> Idle | Disambiguating | CollectingParameter
/// - any non-Idle state -> Idle (cancel)
pub fn validate_transition(from: DialogueState, to: DialogueState) -> Result<(), ActionError> {
    use DialogueState::*;

    let valid = matches!(
        (from, to),
        (Idle, Classifying)
            | (Classifying, Disambiguating)
            | (Classifying, CollectingParameter)
            | (Classifying, Executing)
            | (Disambiguating, Executing)
            | (Disambiguating, Disambiguating)
            | (Disambiguating, Classifying)
            | (CollectingParameter, Executing)
            | (CollectingParameter, CollectingParameter)
            | (CollectingParameter, Classifying)
            | (Executing, Disambiguating)
            | (Executing, CollectingParameter)
    ) || (to == Idle && from != Idle);

    if valid {
        Ok(())
    } else {
        Err(ActionError::InvalidTransition(from, to))
    }
}

/// Tracks the states a single turn passes through.
#[derive(Debug, Clone)]
pub struct DialogueMachine {
    state: DialogueState,
    path: Vec<DialogueState>,
}

impl DialogueMachine {
    pub fn new(start: DialogueState) -> Self {
        Self {
            state: start,
            path: vec![start],
        }
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn path(&self) -> &[DialogueState] {
        &self.path
    }

    /// Move to `to`, rejecting transitions the table does not allow.
    pub fn advance(&mut self, to: DialogueState) -> Result<(), ActionError> {
        validate_transition(self.state, to)?;
        debug!(from = %self.state, to = %to, "Dialogue transition");
        self.state = to;
        self.path.push(to);
        Ok(())
    }

    /// Cancel from wherever the dialogue is.
    pub fn cancel(&mut self) {
        if self.state != DialogueState::Idle {
            self.state = DialogueState::Idle;
            self.path.push(DialogueState::Idle);
        }
    }
}
