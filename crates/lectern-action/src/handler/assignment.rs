//! Assignment (coursework) handler.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use lectern_core::intent::Intent;
use lectern_core::taxonomy::keys;
use serde_json::{json, Map, Value};

use super::{
    create_in_course, plural, resolve_course, resolve_entity, ActionCall, ActionHandler,
    BackendResultExt, Lookup, Step,
};
use crate::types::{Entity, EntityKind, FailureKind, OrchestratorResponse};

pub struct AssignmentHandler;

#[async_trait]
impl ActionHandler for AssignmentHandler {
    fn intents(&self) -> &'static [Intent] {
        &[
            Intent::ListAssignments,
            Intent::CreateAssignment,
            Intent::UpdateAssignment,
            Intent::DeleteAssignment,
        ]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let step = match call.intent {
            Intent::ListAssignments => list_assignments(call).await,
            Intent::CreateAssignment => create_assignment(call).await,
            Intent::UpdateAssignment => update_assignment(call).await,
            _ => delete_assignment(call).await,
        };
        step.unwrap_or_else(|response| response)
    }
}

/// Resolve the assignment named in the call inside `course`.
pub(crate) async fn resolve_assignment(call: &ActionCall<'_>, course: &Entity) -> Step<Entity> {
    resolve_entity(
        call,
        Lookup {
            kind: EntityKind::Assignment {
                course_id: course.id.clone(),
            },
            name_key: keys::ASSIGNMENT_TITLE,
            id_key: keys::ASSIGNMENT_ID,
            noun: "assignment",
        },
    )
    .await
}

/// Due date text for a coursework record, if it has one.
pub(crate) fn due_label(entity: &Entity) -> Option<String> {
    let due = entity.raw.get("dueDate")?;
    let year = due.get("year")?.as_i64()?;
    let month = due.get("month")?.as_i64()?;
    let day = due.get("day")?.as_i64()?;
    Some(format!("{:04}-{:02}-{:02}", year, month, day))
}

/// Backend due-date fields from `dueDate` / `dueTime` parameters.
fn due_fields(call: &ActionCall<'_>) -> Step<Map<String, Value>> {
    let mut fields = Map::new();
    let Some(date_text) = call.str_param(keys::DUE_DATE) else {
        return Ok(fields);
    };
    let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d").map_err(|_| {
        OrchestratorResponse::failed(
            FailureKind::InvalidInput,
            format!("I couldn't understand the due date \"{}\".", date_text),
        )
    })?;
    let time = call
        .str_param(keys::DUE_TIME)
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
        .unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default());

    fields.insert(
        "dueDate".into(),
        json!({"year": date.year(), "month": date.month(), "day": date.day()}),
    );
    fields.insert(
        "dueTime".into(),
        json!({"hours": time.hour(), "minutes": time.minute()}),
    );
    Ok(fields)
}

async fn list_assignments(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let assignments = call
        .backend
        .list(
            call.token,
            &EntityKind::Assignment {
                course_id: course.id.clone(),
            },
        )
        .await
        .or_fail(call.intent)?;

    if assignments.is_empty() {
        return Ok(OrchestratorResponse::completed(format!(
            "There are no assignments in \"{}\" yet.",
            course.display_name
        )));
    }

    let lines: Vec<String> = assignments
        .iter()
        .map(|a| match due_label(a) {
            Some(due) => format!("- {} (due {})", a.display_name, due),
            None => format!("- {}", a.display_name),
        })
        .collect();
    Ok(OrchestratorResponse::completed_with(
        format!(
            "\"{}\" has {}:\n{}",
            course.display_name,
            plural(assignments.len(), "assignment"),
            lines.join("\n")
        ),
        json!({"count": assignments.len()}),
    ))
}

async fn create_assignment(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let Some(title) = call.str_param(keys::TITLE) else {
        return Err(call.ask_for(keys::TITLE));
    };
    let due = due_fields(call)?;
    let course = resolve_course(call).await?;

    let mut body = Map::new();
    body.insert("title".into(), json!(title));
    body.insert("workType".into(), json!("ASSIGNMENT"));
    body.insert("state".into(), json!("PUBLISHED"));
    if let Some(description) = call.str_param(keys::DESCRIPTION) {
        body.insert("description".into(), json!(description));
    }
    if let Some(points) = call.number_param(keys::MAX_POINTS) {
        body.insert("maxPoints".into(), json!(points));
    }
    body.extend(due);

    let kind = EntityKind::Assignment {
        course_id: course.id.clone(),
    };
    let created = create_in_course(call, &course, &kind, Value::Object(body))
        .await
        .or_fail(call.intent)?;

    let mut message = format!(
        "Created the assignment \"{}\" in \"{}\"",
        created.display_name, course.display_name
    );
    if let Some(due) = due_label(&created) {
        message.push_str(&format!(", due {}", due));
    }
    message.push('.');
    Ok(OrchestratorResponse::completed_with(
        message,
        json!({"id": created.id, "courseId": course.id}),
    ))
}

async fn update_assignment(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let mut changes = due_fields(call)?;
    if let Some(new_title) = call.str_param(keys::NEW_NAME) {
        changes.insert("title".into(), json!(new_title));
    }
    if let Some(points) = call.number_param(keys::MAX_POINTS) {
        changes.insert("maxPoints".into(), json!(points));
    }
    if changes.is_empty() {
        return Err(call.ask_for(keys::DUE_DATE));
    }

    let course = resolve_course(call).await?;
    let assignment = resolve_assignment(call, &course).await?;
    let updated = call
        .backend
        .patch(
            call.token,
            &EntityKind::Assignment {
                course_id: course.id.clone(),
            },
            &assignment.id,
            Value::Object(changes),
        )
        .await
        .or_fail(call.intent)?;

    Ok(OrchestratorResponse::completed(format!(
        "Updated the assignment \"{}\" in \"{}\".",
        updated.display_name, course.display_name
    )))
}

async fn delete_assignment(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let assignment = resolve_assignment(call, &course).await?;
    call.backend
        .delete(
            call.token,
            &EntityKind::Assignment {
                course_id: course.id.clone(),
            },
            &assignment.id,
        )
        .await
        .or_fail(call.intent)?;
    Ok(OrchestratorResponse::completed(format!(
        "Deleted the assignment \"{}\" from \"{}\".",
        assignment.display_name, course.display_name
    )))
}
