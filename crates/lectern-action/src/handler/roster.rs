//! Roster handler: students, teachers and invitations.

use async_trait::async_trait;
use lectern_core::intent::Intent;
use lectern_core::taxonomy::keys;
use serde_json::json;
use tracing::info;

use super::{
    backend_failure, plural, resolve_course, ActionCall, ActionHandler, BackendResultExt, Step,
};
use crate::backend::BackendError;
use crate::types::{Entity, EntityKind, FailureKind, OrchestratorResponse};

pub struct RosterHandler;

#[async_trait]
impl ActionHandler for RosterHandler {
    fn intents(&self) -> &'static [Intent] {
        &[
            Intent::ShowRoster,
            Intent::ListTeachers,
            Intent::InviteStudents,
            Intent::InviteTeachers,
            Intent::RemoveStudent,
            Intent::ListInvitations,
        ]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let step = match call.intent {
            Intent::ShowRoster => list_people(call, Role::Student).await,
            Intent::ListTeachers => list_people(call, Role::Teacher).await,
            Intent::InviteStudents => invite(call, Role::Student).await,
            Intent::InviteTeachers => invite(call, Role::Teacher).await,
            Intent::RemoveStudent => remove_students(call).await,
            _ => list_invitations(call).await,
        };
        step.unwrap_or_else(|response| response)
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Student,
    Teacher,
}

impl Role {
    fn noun(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    fn invitation_role(self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
        }
    }

    fn emails_key(self) -> &'static str {
        match self {
            Role::Student => keys::STUDENT_EMAILS,
            Role::Teacher => keys::TEACHER_EMAILS,
        }
    }

    fn kind(self, course_id: &str) -> EntityKind {
        let course_id = course_id.to_string();
        match self {
            Role::Student => EntityKind::Student { course_id },
            Role::Teacher => EntityKind::Teacher { course_id },
        }
    }
}

fn looks_like_email(text: &str) -> bool {
    match text.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

fn person_line(person: &Entity) -> String {
    match person.email() {
        Some(email) if email != person.display_name => format!("- {} ({})", person.display_name, email),
        _ => format!("- {}", person.display_name),
    }
}

/// Short reason for one failed email in a batch.
fn batch_reason(err: &BackendError) -> &'static str {
    match err {
        BackendError::Http { status: 409, .. } => "already invited",
        BackendError::Http { status: 404, .. } => "not found",
        BackendError::Http { status: 401 | 403, .. } => "not permitted",
        BackendError::Timeout | BackendError::Transport(_) => "service unavailable",
        _ => "rejected",
    }
}

async fn list_people(call: &ActionCall<'_>, role: Role) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let people = call
        .backend
        .list(call.token, &role.kind(&course.id))
        .await
        .or_fail(call.intent)?;

    if people.is_empty() {
        let message = match role {
            Role::Student => format!("No students are enrolled in \"{}\" yet.", course.display_name),
            Role::Teacher => format!("\"{}\" has no teachers listed.", course.display_name),
        };
        return Ok(OrchestratorResponse::completed_with(message, json!({"count": 0})));
    }

    let lines: Vec<String> = people.iter().map(person_line).collect();
    Ok(OrchestratorResponse::completed_with(
        format!(
            "\"{}\" has {}:\n{}",
            course.display_name,
            plural(people.len(), role.noun()),
            lines.join("\n")
        ),
        json!({"count": people.len()}),
    ))
}

async fn invite(call: &ActionCall<'_>, role: Role) -> Step<OrchestratorResponse> {
    let emails = call.list_param(role.emails_key());
    if emails.is_empty() {
        return Err(call.ask_for(role.emails_key()));
    }
    let (valid, invalid): (Vec<String>, Vec<String>) =
        emails.into_iter().partition(|e| looks_like_email(e));
    if valid.is_empty() {
        return Err(OrchestratorResponse::failed(
            FailureKind::InvalidInput,
            format!("\"{}\" doesn't look like an email address.", invalid.join(", ")),
        ));
    }

    let course = resolve_course(call).await?;
    let kind = EntityKind::Invitation { course_id: None };

    let mut invited = Vec::new();
    let mut failed: Vec<(String, BackendError)> = Vec::new();
    for email in valid {
        let body = json!({
            "courseId": course.id,
            "userId": email,
            "role": role.invitation_role(),
        });
        match call.backend.create(call.token, &kind, body).await {
            Ok(_) => invited.push(email),
            Err(err) => failed.push((email, err)),
        }
    }

    info!(
        intent = %call.intent,
        course_id = %course.id,
        invited = invited.len(),
        failed = failed.len(),
        "Invitations sent"
    );

    if invited.is_empty() {
        if let Some((_, err)) = failed.first() {
            return Err(backend_failure(call.intent, err));
        }
    }

    let mut message = format!(
        "Invited {} to \"{}\": {}.",
        plural(invited.len(), role.noun()),
        course.display_name,
        invited.join(", ")
    );
    if !failed.is_empty() {
        let details: Vec<String> = failed
            .iter()
            .map(|(email, err)| format!("{} ({})", email, batch_reason(err)))
            .collect();
        message.push_str(&format!(" Couldn't invite: {}.", details.join(", ")));
    }
    if !invalid.is_empty() {
        message.push_str(&format!(" Skipped invalid addresses: {}.", invalid.join(", ")));
    }

    Ok(OrchestratorResponse::completed_with(
        message,
        json!({"invited": invited, "failed": failed.iter().map(|(e, _)| e).collect::<Vec<_>>()}),
    ))
}

async fn remove_students(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let emails = call.list_param(keys::STUDENT_EMAILS);
    if emails.is_empty() {
        return Err(call.ask_for(keys::STUDENT_EMAILS));
    }
    let course = resolve_course(call).await?;
    let kind = Role::Student.kind(&course.id);

    let mut removed = Vec::new();
    let mut missing = Vec::new();
    for email in emails {
        match call.backend.delete(call.token, &kind, &email).await {
            Ok(()) => removed.push(email),
            Err(BackendError::Http { status: 404, .. }) => missing.push(email),
            Err(err) => return Err(backend_failure(call.intent, &err)),
        }
    }

    if removed.is_empty() {
        return Err(OrchestratorResponse::failed(
            FailureKind::NotFound,
            format!(
                "{} isn't enrolled in \"{}\".",
                missing.join(", "),
                course.display_name
            ),
        ));
    }

    let mut message = format!(
        "Removed {} from \"{}\": {}.",
        plural(removed.len(), "student"),
        course.display_name,
        removed.join(", ")
    );
    if !missing.is_empty() {
        message.push_str(&format!(" Not enrolled: {}.", missing.join(", ")));
    }
    Ok(OrchestratorResponse::completed(message))
}

async fn list_invitations(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let invitations = call
        .backend
        .list(
            call.token,
            &EntityKind::Invitation {
                course_id: Some(course.id.clone()),
            },
        )
        .await
        .or_fail(call.intent)?;

    if invitations.is_empty() {
        return Ok(OrchestratorResponse::completed(format!(
            "There are no open invitations for \"{}\".",
            course.display_name
        )));
    }

    let lines: Vec<String> = invitations
        .iter()
        .map(|inv| {
            let who = inv.field("userId").unwrap_or(&inv.id);
            match inv.field("role") {
                Some(role) => format!("- {} ({})", who, role.to_lowercase()),
                None => format!("- {}", who),
            }
        })
        .collect();
    Ok(OrchestratorResponse::completed_with(
        format!(
            "\"{}\" has {}:\n{}",
            course.display_name,
            plural(invitations.len(), "open invitation"),
            lines.join("\n")
        ),
        json!({"count": invitations.len()}),
    ))
}
