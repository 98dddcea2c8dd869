//! Action handler registry and trait definition.
//!
//! Defines the `ActionHandler` async trait, the per-call context handed to
//! handlers, the registry that maps intents to handlers, and the helpers
//! handlers share: entity resolution against fresh backend lists, backend
//! error translation, and the activate-then-retry remediation.

pub mod announcement;
pub mod assignment;
pub mod conversation;
pub mod course;
pub mod email;
pub mod grade;
pub mod meeting;
pub mod roster;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lectern_core::context::{OngoingAction, PendingAction};
use lectern_core::intent::Intent;
use lectern_core::taxonomy::{keys, question_for, spec_for};
use lectern_core::types::{AuthToken, Parameters, RequestContext};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::backend::{BackendError, BackendService, ErrorClass};
use crate::resolver::{resolve, EntityMatch};
use crate::types::{numbered_options, Entity, EntityKind, FailureKind, OrchestratorResponse};

/// Early exit carrying the response to return.
pub type Step<T> = Result<T, OrchestratorResponse>;

pub const TRANSIENT_MESSAGE: &str =
    "The classroom service is temporarily unavailable. Please try again in a moment.";
pub const FORBIDDEN_MESSAGE: &str = "You don't have permission to do that in this course.";
pub const GONE_MESSAGE: &str =
    "I couldn't find that item anymore. It may have been changed or deleted. Please try again.";
pub const PRECONDITION_MESSAGE: &str =
    "This course needs to be activated by an administrator before you can post to it.";
pub const REJECTED_MESSAGE: &str = "The classroom service rejected that request.";

/// Everything a handler needs for one call.
pub struct ActionCall<'a> {
    pub intent: Intent,
    pub params: &'a Parameters,
    pub raw_message: &'a str,
    pub token: &'a AuthToken,
    pub request: &'a RequestContext,
    pub backend: &'a dyn BackendService,
}

impl ActionCall<'_> {
    /// Trimmed, non-empty string parameter.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// List parameter; a single string counts as a one-element list.
    pub fn list_param(&self, key: &str) -> Vec<String> {
        match self.params.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => s
                .split([',', ' ', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn number_param(&self, key: &str) -> Option<f64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Ask for `param` and remember everything collected so far.
    pub fn ask_for(&self, param: &str) -> OrchestratorResponse {
        let spec = spec_for(self.intent);
        let mut required: Vec<&str> = spec.required_names();
        if !required.contains(&param) {
            required.push(param);
        }
        OrchestratorResponse::NeedsParameter {
            message: question_for(self.intent, param),
            missing_parameters: vec![param.to_string()],
            ongoing: OngoingAction::new(self.intent, &required, self.params.clone()),
        }
    }
}

/// Executes one family of intents against the backend.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Intents this handler serves.
    fn intents(&self) -> &'static [Intent];

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse;
}

/// Maps intents to their handlers.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<Intent, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        for intent in handler.intents() {
            self.handlers.insert(*intent, Arc::clone(&handler));
        }
    }

    /// Register the built-in handlers for every intent.
    pub fn register_defaults(&mut self) {
        self.register(Arc::new(course::CourseHandler));
        self.register(Arc::new(assignment::AssignmentHandler));
        self.register(Arc::new(announcement::AnnouncementHandler));
        self.register(Arc::new(roster::RosterHandler));
        self.register(Arc::new(grade::GradeHandler));
        self.register(Arc::new(meeting::MeetingHandler));
        self.register(Arc::new(email::EmailHandler));
        self.register(Arc::new(conversation::ConversationHandler));
    }

    pub fn get(&self, intent: Intent) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&intent).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// =============================================================================
// Backend error translation
// =============================================================================

/// Turn a backend error into a user-safe failure. The raw error is logged.
pub fn backend_failure(intent: Intent, err: &BackendError) -> OrchestratorResponse {
    warn!(intent = %intent, error = %err, "Backend call failed");
    match err.class() {
        ErrorClass::Transient => OrchestratorResponse::failed(FailureKind::Transient, TRANSIENT_MESSAGE),
        ErrorClass::Permission => OrchestratorResponse::failed(FailureKind::Forbidden, FORBIDDEN_MESSAGE),
        ErrorClass::NotFound => OrchestratorResponse::failed(FailureKind::NotFound, GONE_MESSAGE),
        ErrorClass::Precondition => {
            OrchestratorResponse::failed(FailureKind::PreconditionManual, PRECONDITION_MESSAGE)
        }
        ErrorClass::Rejected => OrchestratorResponse::failed(
            FailureKind::Rejected,
            err.clean_message().unwrap_or(REJECTED_MESSAGE),
        ),
    }
}

/// `?`-friendly conversion of backend results into handler steps.
pub trait BackendResultExt<T> {
    fn or_fail(self, intent: Intent) -> Step<T>;
}

impl<T> BackendResultExt<T> for Result<T, BackendError> {
    fn or_fail(self, intent: Intent) -> Step<T> {
        self.map_err(|e| backend_failure(intent, &e))
    }
}

// =============================================================================
// Resolution helpers
// =============================================================================

/// How to look up one kind of entity by name.
pub struct Lookup<'a> {
    pub kind: EntityKind,
    /// Parameter holding the free-text name.
    pub name_key: &'a str,
    /// Parameter holding an already chosen id.
    pub id_key: &'a str,
    /// Human noun, e.g. "course".
    pub noun: &'a str,
}

/// Resolve an entity by id (re-fetched) or by name against a fresh list.
///
/// `none` fails with the available names; `many` asks the user to choose and
/// stores everything known so far in the pending action.
pub async fn resolve_entity(call: &ActionCall<'_>, lookup: Lookup<'_>) -> Step<Entity> {
    if let Some(id) = call.str_param(lookup.id_key) {
        return call
            .backend
            .get(call.token, &lookup.kind, id)
            .await
            .or_fail(call.intent);
    }

    let Some(fragment) = call.str_param(lookup.name_key) else {
        return Err(call.ask_for(lookup.name_key));
    };

    let candidates = call
        .backend
        .list(call.token, &lookup.kind)
        .await
        .or_fail(call.intent)?;

    match resolve(fragment, &candidates) {
        EntityMatch::Unique(entity) => Ok(entity),
        EntityMatch::None => {
            info!(intent = %call.intent, noun = lookup.noun, fragment, "No entity matched");
            Err(not_found_response(lookup.noun, fragment, &candidates))
        }
        EntityMatch::Many(matches) => {
            let options: Vec<_> = matches.iter().map(Entity::to_option).collect();
            let message = format!(
                "I found {} {}s matching \"{}\". Which one did you mean?\n{}",
                options.len(),
                lookup.noun,
                fragment,
                numbered_options(&options)
            );
            Err(OrchestratorResponse::NeedsDisambiguation {
                message,
                pending: PendingAction {
                    intent: call.intent,
                    binds: lookup.id_key.to_string(),
                    options: options.clone(),
                    data: call.params.clone(),
                },
                options,
            })
        }
    }
}

fn not_found_response(noun: &str, fragment: &str, candidates: &[Entity]) -> OrchestratorResponse {
    let message = if candidates.is_empty() {
        format!("I couldn't find a {} matching \"{}\". You don't have any {}s yet.", noun, fragment, noun)
    } else {
        let names: Vec<&str> = candidates
            .iter()
            .take(10)
            .map(|c| c.display_name.as_str())
            .collect();
        format!(
            "I couldn't find a {} matching \"{}\". Available {}s: {}.",
            noun,
            fragment,
            noun,
            names.join(", ")
        )
    };
    OrchestratorResponse::failed(FailureKind::NotFound, message)
}

/// Resolve the course named in the call.
pub async fn resolve_course(call: &ActionCall<'_>) -> Step<Entity> {
    resolve_entity(
        call,
        Lookup {
            kind: EntityKind::Course,
            name_key: keys::COURSE_NAME,
            id_key: keys::COURSE_ID,
            noun: "course",
        },
    )
    .await
}

/// Create `body` under a course, activating the course and retrying once if
/// the backend reports it is not in the right state.
pub async fn create_in_course(
    call: &ActionCall<'_>,
    course: &Entity,
    kind: &EntityKind,
    body: Value,
) -> Result<Entity, BackendError> {
    match call.backend.create(call.token, kind, body.clone()).await {
        Err(err) if err.class() == ErrorClass::Precondition => {
            info!(
                course_id = %course.id,
                error = %err,
                "Course not ready for posting, activating and retrying once"
            );
            if let Err(activation) = call
                .backend
                .patch(
                    call.token,
                    &EntityKind::Course,
                    &course.id,
                    json!({"courseState": "ACTIVE"}),
                )
                .await
            {
                warn!(course_id = %course.id, error = %activation, "Course activation failed");
                // A transient activation failure is worth retrying later;
                // anything else needs an administrator.
                return Err(if activation.class() == ErrorClass::Transient {
                    activation
                } else {
                    err
                });
            }
            call.backend.create(call.token, kind, body).await
        }
        other => other,
    }
}

/// "1 course" / "3 courses".
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
