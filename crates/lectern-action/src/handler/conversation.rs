//! Replies that need no backend: greetings, help, cancel, unknown.

use async_trait::async_trait;
use lectern_core::intent::Intent;
use lectern_core::taxonomy::INTENT_TABLE;
use lectern_core::types::UserRole;

use super::{ActionCall, ActionHandler};
use crate::types::OrchestratorResponse;

pub const UNKNOWN_MESSAGE: &str = "I'm not sure what you mean. Try something like \"list my courses\", or ask \"what can you do?\".";
pub const CANCELLED_MESSAGE: &str = "Okay, cancelled.";

pub struct ConversationHandler;

#[async_trait]
impl ActionHandler for ConversationHandler {
    fn intents(&self) -> &'static [Intent] {
        &[
            Intent::Greeting,
            Intent::Thanks,
            Intent::Help,
            Intent::CapabilityQuestion,
            Intent::Cancel,
            Intent::Unknown,
        ]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let message = match call.intent {
            Intent::Greeting => match call.request.user_name.as_deref() {
                Some(name) if !name.trim().is_empty() => {
                    format!("Hi {}! What would you like to do with your courses today?", name.trim())
                }
                _ => "Hi! What would you like to do with your courses today?".to_string(),
            },
            Intent::Thanks => "You're welcome!".to_string(),
            Intent::Help => format!(
                "You can ask me in plain words, for example \"list my courses\" or \"create an assignment called Essay 1 in English\". I can:\n{}",
                capability_lines(call.request.role)
            ),
            Intent::CapabilityQuestion => {
                format!("Here's what I can do for you:\n{}", capability_lines(call.request.role))
            }
            Intent::Cancel => CANCELLED_MESSAGE.to_string(),
            _ => UNKNOWN_MESSAGE.to_string(),
        };
        OrchestratorResponse::completed(message)
    }
}

/// One line per action the role may run, in table order.
fn capability_lines(role: UserRole) -> String {
    INTENT_TABLE
        .iter()
        .filter(|spec| !spec.intent.is_conversational() && spec.policy.allows(role))
        .map(|spec| format!("- {}", spec.description))
        .collect::<Vec<_>>()
        .join("\n")
}
