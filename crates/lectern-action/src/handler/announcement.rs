//! Announcement handler.

use async_trait::async_trait;
use lectern_core::intent::Intent;
use lectern_core::taxonomy::keys;
use serde_json::json;

use super::{
    create_in_course, plural, resolve_course, resolve_entity, ActionCall, ActionHandler,
    BackendResultExt, Lookup, Step,
};
use crate::types::{EntityKind, OrchestratorResponse};

const PREVIEW_CHARS: usize = 80;

pub struct AnnouncementHandler;

#[async_trait]
impl ActionHandler for AnnouncementHandler {
    fn intents(&self) -> &'static [Intent] {
        &[
            Intent::ListAnnouncements,
            Intent::CreateAnnouncement,
            Intent::DeleteAnnouncement,
        ]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let step = match call.intent {
            Intent::ListAnnouncements => list_announcements(call).await,
            Intent::CreateAnnouncement => create_announcement(call).await,
            _ => delete_announcement(call).await,
        };
        step.unwrap_or_else(|response| response)
    }
}

fn preview(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= PREVIEW_CHARS {
        single_line
    } else {
        let cut: String = single_line.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

async fn list_announcements(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let announcements = call
        .backend
        .list(
            call.token,
            &EntityKind::Announcement {
                course_id: course.id.clone(),
            },
        )
        .await
        .or_fail(call.intent)?;

    if announcements.is_empty() {
        return Ok(OrchestratorResponse::completed(format!(
            "There are no announcements in \"{}\" yet.",
            course.display_name
        )));
    }

    let lines: Vec<String> = announcements
        .iter()
        .take(10)
        .map(|a| format!("- {}", preview(&a.display_name)))
        .collect();
    Ok(OrchestratorResponse::completed_with(
        format!(
            "\"{}\" has {}:\n{}",
            course.display_name,
            plural(announcements.len(), "announcement"),
            lines.join("\n")
        ),
        json!({"count": announcements.len()}),
    ))
}

async fn create_announcement(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let Some(text) = call.str_param(keys::TEXT) else {
        return Err(call.ask_for(keys::TEXT));
    };
    let course = resolve_course(call).await?;
    let kind = EntityKind::Announcement {
        course_id: course.id.clone(),
    };
    let posted = create_in_course(
        call,
        &course,
        &kind,
        json!({"text": text, "state": "PUBLISHED"}),
    )
    .await
    .or_fail(call.intent)?;

    Ok(OrchestratorResponse::completed_with(
        format!(
            "Posted the announcement to \"{}\": \"{}\"",
            course.display_name,
            preview(text)
        ),
        json!({"id": posted.id, "courseId": course.id}),
    ))
}

async fn delete_announcement(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let kind = EntityKind::Announcement {
        course_id: course.id.clone(),
    };
    let announcement = resolve_entity(
        call,
        Lookup {
            kind: kind.clone(),
            name_key: keys::TEXT,
            id_key: keys::ANNOUNCEMENT_ID,
            noun: "announcement",
        },
    )
    .await?;
    call.backend
        .delete(call.token, &kind, &announcement.id)
        .await
        .or_fail(call.intent)?;
    Ok(OrchestratorResponse::completed(format!(
        "Deleted the announcement \"{}\" from \"{}\".",
        preview(&announcement.display_name),
        course.display_name
    )))
}
