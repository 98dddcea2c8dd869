//! Action orchestrator.
//!
//! Takes a classified intent and turns it into exactly one outcome:
//! role check, intent re-routing, required-parameter check, then dispatch
//! to the registered handler. Also resumes a pending disambiguation from the
//! user's reply.

use std::sync::Arc;

use lectern_core::context::{has_value, OngoingAction, PendingAction};
use lectern_core::intent::{Intent, IntentResult, IntentSource};
use lectern_core::taxonomy::{keys, missing_parameters, question_for, spec_for};
use lectern_core::types::{AuthToken, Parameters, RequestContext};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::BackendService;
use crate::error::ActionError;
use crate::handler::{ActionCall, ActionRegistry};
use crate::resolver::match_reply;
use crate::types::{numbered_options, FailureKind, OrchestratorResponse};

pub const UNAUTHORIZED_MESSAGE: &str = "Sorry, you're not allowed to perform this action.";

/// Id parameters that stand in for a required name once an entity is chosen.
const SATISFIED_BY: &[(&str, &str)] = &[
    (keys::COURSE_NAME, keys::COURSE_ID),
    (keys::ASSIGNMENT_TITLE, keys::ASSIGNMENT_ID),
    (keys::TITLE, keys::MEETING_ID),
    (keys::TEXT, keys::ANNOUNCEMENT_ID),
];

/// Dispatches classified intents to handlers against one backend.
pub struct ActionOrchestrator {
    registry: ActionRegistry,
    backend: Arc<dyn BackendService>,
}

impl ActionOrchestrator {
    pub fn new(registry: ActionRegistry, backend: Arc<dyn BackendService>) -> Self {
        Self { registry, backend }
    }

    /// Orchestrator with every built-in handler registered.
    pub fn with_defaults(backend: Arc<dyn BackendService>) -> Self {
        let mut registry = ActionRegistry::new();
        registry.register_defaults();
        Self::new(registry, backend)
    }

    pub fn backend(&self) -> &Arc<dyn BackendService> {
        &self.backend
    }

    /// Execute one classified intent. Never fails; problems become `Failed`.
    pub async fn execute(
        &self,
        result: &IntentResult,
        raw_message: &str,
        token: &AuthToken,
        request: &RequestContext,
    ) -> OrchestratorResponse {
        let (intent, params) = reroute(result.intent, &result.parameters, raw_message);

        let spec = spec_for(intent);
        if !spec.policy.allows(request.role) {
            info!(intent = %intent, role = ?request.role, "Intent denied for role");
            return OrchestratorResponse::failed(FailureKind::Unauthorized, UNAUTHORIZED_MESSAGE);
        }

        let missing = unsatisfied(intent, &params);
        if let Some(first) = missing.first() {
            debug!(intent = %intent, missing = ?missing, "Asking for missing parameter");
            return OrchestratorResponse::NeedsParameter {
                message: question_for(intent, first),
                missing_parameters: missing.iter().map(|m| m.to_string()).collect(),
                ongoing: OngoingAction::new(intent, &spec.required_names(), params.clone()),
            };
        }

        let Some(handler) = self.registry.get(intent) else {
            let err = ActionError::UnregisteredHandler(intent);
            warn!(error = %err, "Cannot dispatch intent");
            return OrchestratorResponse::failed(
                FailureKind::Rejected,
                "I can't do that yet.",
            );
        };

        let call = ActionCall {
            intent,
            params: &params,
            raw_message,
            token,
            request,
            backend: self.backend.as_ref(),
        };
        let response = handler.execute(&call).await;
        info!(
            intent = %intent,
            source = %result.source,
            status = response.status(),
            "Action finished"
        );
        response
    }

    /// Resolve a pending disambiguation with the user's reply.
    ///
    /// A matching reply binds the chosen id and re-executes the stored
    /// intent (the entity is fetched again, not taken from the option). Any
    /// other reply re-asks with the same options.
    pub async fn resume(
        &self,
        pending: &PendingAction,
        reply: &str,
        token: &AuthToken,
        request: &RequestContext,
    ) -> OrchestratorResponse {
        let Some(chosen) = match_reply(reply, &pending.options) else {
            debug!(intent = %pending.intent, "Reply matched no offered option");
            return reask(pending);
        };

        let mut params = pending.data.clone();
        params.insert(pending.binds.clone(), Value::String(chosen.id.clone()));
        info!(
            intent = %pending.intent,
            binds = %pending.binds,
            chosen = %chosen.id,
            "Pending action resolved"
        );
        let result = IntentResult::new(pending.intent, 1.0, params, IntentSource::Dialogue);
        self.execute(&result, reply, token, request).await
    }
}

/// Student invitations that mention teachers are teacher invitations.
fn reroute(intent: Intent, params: &Parameters, raw_message: &str) -> (Intent, Parameters) {
    if intent == Intent::InviteStudents && raw_message.to_lowercase().contains("teacher") {
        let mut params = params.clone();
        if let Some(emails) = params.remove(keys::STUDENT_EMAILS) {
            params.insert(keys::TEACHER_EMAILS.to_string(), emails);
        }
        debug!("Re-routing student invitation to teacher invitation");
        return (Intent::InviteTeachers, params);
    }
    (intent, params.clone())
}

/// Required parameters still missing, counting chosen ids as names.
fn unsatisfied(intent: Intent, params: &Parameters) -> Vec<&'static str> {
    missing_parameters(intent, params)
        .into_iter()
        .filter(|name| {
            !SATISFIED_BY
                .iter()
                .any(|(n, id)| n == name && has_value(params, id))
        })
        .collect()
}

fn reask(pending: &PendingAction) -> OrchestratorResponse {
    OrchestratorResponse::NeedsDisambiguation {
        message: format!(
            "I didn't catch which one you meant. Please reply with a number:\n{}",
            numbered_options(&pending.options)
        ),
        options: pending.options.clone(),
        pending: pending.clone(),
    }
}
