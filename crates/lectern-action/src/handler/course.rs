//! Course handler: list, create, update, archive, delete, details.

use async_trait::async_trait;
use lectern_core::intent::Intent;
use lectern_core::taxonomy::keys;
use serde_json::{json, Map, Value};
use tracing::info;

use super::{plural, resolve_course, ActionCall, ActionHandler, BackendResultExt, Step};
use crate::backend::ErrorClass;
use crate::types::{EntityKind, OrchestratorResponse};

pub struct CourseHandler;

#[async_trait]
impl ActionHandler for CourseHandler {
    fn intents(&self) -> &'static [Intent] {
        &[
            Intent::ListCourses,
            Intent::CreateCourse,
            Intent::UpdateCourse,
            Intent::DeleteCourse,
            Intent::ArchiveCourse,
            Intent::GetCourseDetails,
        ]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let step = match call.intent {
            Intent::ListCourses => list_courses(call).await,
            Intent::CreateCourse => create_course(call).await,
            Intent::UpdateCourse => update_course(call).await,
            Intent::DeleteCourse => delete_course(call).await,
            Intent::ArchiveCourse => archive_course(call).await,
            _ => course_details(call).await,
        };
        step.unwrap_or_else(|response| response)
    }
}

async fn list_courses(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let courses = call
        .backend
        .list(call.token, &EntityKind::Course)
        .await
        .or_fail(call.intent)?;

    if courses.is_empty() {
        return Ok(OrchestratorResponse::completed_with(
            "You don't have any courses yet.",
            json!({"count": 0, "courses": []}),
        ));
    }

    let lines: Vec<String> = courses
        .iter()
        .map(|c| format!("- {}", c.to_option().label()))
        .collect();
    let summary: Vec<Value> = courses
        .iter()
        .map(|c| json!({"id": c.id, "name": c.display_name, "state": c.field("courseState")}))
        .collect();
    Ok(OrchestratorResponse::completed_with(
        format!("You have {}:\n{}", plural(courses.len(), "course"), lines.join("\n")),
        json!({"count": courses.len(), "courses": summary}),
    ))
}

async fn create_course(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let Some(name) = call.str_param(keys::COURSE_NAME) else {
        return Err(call.ask_for(keys::COURSE_NAME));
    };

    let mut body = Map::new();
    body.insert("name".into(), json!(name));
    body.insert("ownerId".into(), json!("me"));
    if let Some(section) = call.str_param(keys::SECTION) {
        body.insert("section".into(), json!(section));
    }
    if let Some(description) = call.str_param(keys::DESCRIPTION) {
        body.insert("description".into(), json!(description));
    }

    let course = call
        .backend
        .create(call.token, &EntityKind::Course, Value::Object(body))
        .await
        .or_fail(call.intent)?;

    info!(course_id = %course.id, "Course created");
    let mut message = format!("Created the course \"{}\".", course.display_name);
    if let Some(code) = course.field("enrollmentCode") {
        message.push_str(&format!(" Students can join with the code {}.", code));
    }
    Ok(OrchestratorResponse::completed_with(
        message,
        json!({"id": course.id, "name": course.display_name}),
    ))
}

async fn update_course(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let mut changes = Map::new();
    if let Some(new_name) = call.str_param(keys::NEW_NAME) {
        changes.insert("name".into(), json!(new_name));
    }
    if let Some(section) = call.str_param(keys::SECTION) {
        changes.insert("section".into(), json!(section));
    }
    if let Some(description) = call.str_param(keys::DESCRIPTION) {
        changes.insert("description".into(), json!(description));
    }
    if changes.is_empty() {
        return Err(call.ask_for(keys::NEW_NAME));
    }

    let course = resolve_course(call).await?;
    let updated = call
        .backend
        .patch(call.token, &EntityKind::Course, &course.id, Value::Object(changes))
        .await
        .or_fail(call.intent)?;

    let message = if updated.display_name != course.display_name {
        format!(
            "Renamed \"{}\" to \"{}\".",
            course.display_name, updated.display_name
        )
    } else {
        format!("Updated the course \"{}\".", updated.display_name)
    };
    Ok(OrchestratorResponse::completed_with(
        message,
        json!({"id": updated.id, "name": updated.display_name}),
    ))
}

async fn archive_course(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    if course.field("courseState") == Some("ARCHIVED") {
        return Ok(OrchestratorResponse::completed(format!(
            "\"{}\" is already archived.",
            course.display_name
        )));
    }
    call.backend
        .patch(
            call.token,
            &EntityKind::Course,
            &course.id,
            json!({"courseState": "ARCHIVED"}),
        )
        .await
        .or_fail(call.intent)?;
    Ok(OrchestratorResponse::completed(format!(
        "Archived the course \"{}\".",
        course.display_name
    )))
}

/// Only archived courses can be deleted; archive first and retry once when
/// the backend refuses.
async fn delete_course(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let result = match call
        .backend
        .delete(call.token, &EntityKind::Course, &course.id)
        .await
    {
        Err(err) if err.class() == ErrorClass::Precondition => {
            info!(course_id = %course.id, "Archiving course before delete");
            call.backend
                .patch(
                    call.token,
                    &EntityKind::Course,
                    &course.id,
                    json!({"courseState": "ARCHIVED"}),
                )
                .await
                .or_fail(call.intent)?;
            call.backend
                .delete(call.token, &EntityKind::Course, &course.id)
                .await
        }
        other => other,
    };
    result.or_fail(call.intent)?;
    Ok(OrchestratorResponse::completed(format!(
        "Deleted the course \"{}\".",
        course.display_name
    )))
}

async fn course_details(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let mut lines = vec![format!("\"{}\"", course.display_name)];
    for (label, field) in [
        ("Section", "section"),
        ("State", "courseState"),
        ("Room", "room"),
        ("Enrollment code", "enrollmentCode"),
        ("Description", "description"),
    ] {
        if let Some(value) = course.field(field) {
            lines.push(format!("{}: {}", label, value));
        }
    }
    Ok(OrchestratorResponse::completed_with(
        lines.join("\n"),
        course.raw.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendOp};
    use crate::handler::test_support::*;
    use crate::types::FailureKind;

    // ---- list ----

    #[tokio::test]
    async fn test_list_courses_empty() {
        let fx = Fixture::new();
        let p = params(json!({}));
        let r = CourseHandler.execute(&fx.call(Intent::ListCourses, &p, "list my courses")).await;
        assert_eq!(r.message(), "You don't have any courses yet.");
        assert_eq!(fx.backend.calls(BackendOp::List), 1);
    }

    #[tokio::test]
    async fn test_list_courses_counts() {
        let fx = Fixture::new();
        fx.backend.seed_course("Math 101", "ACTIVE");
        fx.backend.seed_course("History", "PROVISIONED");
        let p = params(json!({}));
        let r = CourseHandler.execute(&fx.call(Intent::ListCourses, &p, "")).await;
        match r {
            OrchestratorResponse::Completed { message, data } => {
                assert!(message.starts_with("You have 2 courses:"));
                assert!(message.contains("Math 101"));
                assert_eq!(data.unwrap()["count"], 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_courses_backend_down() {
        let fx = Fixture::new();
        fx.backend.fail_next(BackendOp::List, None, BackendError::http(502, "bad gateway"));
        let p = params(json!({}));
        let r = CourseHandler.execute(&fx.call(Intent::ListCourses, &p, "")).await;
        assert_eq!(r.failure_kind(), Some(FailureKind::Transient));
        assert!(!r.message().contains("bad gateway"));
    }

    // ---- create / update ----

    #[tokio::test]
    async fn test_create_course() {
        let fx = Fixture::new();
        let p = params(json!({"courseName": "Biology", "section": "A"}));
        let r = CourseHandler.execute(&fx.call(Intent::CreateCourse, &p, "")).await;
        assert_eq!(r.message(), "Created the course \"Biology\".");
        let courses = fx.backend.entities(&EntityKind::Course);
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].field("section"), Some("A"));
    }

    #[tokio::test]
    async fn test_update_course_without_changes_asks() {
        let fx = Fixture::new();
        fx.backend.seed_course("Biology", "ACTIVE");
        let p = params(json!({"courseName": "Biology"}));
        let r = CourseHandler.execute(&fx.call(Intent::UpdateCourse, &p, "")).await;
        match r {
            OrchestratorResponse::NeedsParameter {
                missing_parameters,
                ongoing,
                ..
            } => {
                assert_eq!(missing_parameters, vec!["newName"]);
                assert_eq!(ongoing.collected_parameters["courseName"], "Biology");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fx.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_rename_course() {
        let fx = Fixture::new();
        fx.backend.seed_course("Biology", "ACTIVE");
        let p = params(json!({"courseName": "bio", "newName": "Biology II"}));
        let r = CourseHandler.execute(&fx.call(Intent::UpdateCourse, &p, "")).await;
        assert_eq!(r.message(), "Renamed \"Biology\" to \"Biology II\".");
    }

    // ---- archive / delete ----

    #[tokio::test]
    async fn test_archive_course() {
        let fx = Fixture::new();
        fx.backend.seed_course("Chemistry", "ACTIVE");
        let p = params(json!({"courseName": "chem"}));
        let r = CourseHandler.execute(&fx.call(Intent::ArchiveCourse, &p, "")).await;
        assert_eq!(r.message(), "Archived the course \"Chemistry\".");
        let r = CourseHandler.execute(&fx.call(Intent::ArchiveCourse, &p, "")).await;
        assert_eq!(r.message(), "\"Chemistry\" is already archived.");
    }

    #[tokio::test]
    async fn test_delete_course_archives_first_on_precondition() {
        let fx = Fixture::new();
        fx.backend.seed_course("Chemistry", "ACTIVE");
        fx.backend.fail_next(
            BackendOp::Delete,
            Some("course"),
            BackendError::http(400, "Precondition check failed."),
        );
        let p = params(json!({"courseName": "Chemistry"}));
        let r = CourseHandler.execute(&fx.call(Intent::DeleteCourse, &p, "")).await;
        assert_eq!(r.message(), "Deleted the course \"Chemistry\".");
        assert_eq!(fx.backend.calls(BackendOp::Delete), 2);
        assert_eq!(fx.backend.calls(BackendOp::Patch), 1);
        assert!(fx.backend.entities(&EntityKind::Course).is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_course() {
        let fx = Fixture::new();
        fx.backend.seed_course("Chemistry", "ACTIVE");
        let p = params(json!({"courseName": "Physics"}));
        let r = CourseHandler.execute(&fx.call(Intent::DeleteCourse, &p, "")).await;
        assert_eq!(r.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(fx.backend.calls(BackendOp::Delete), 0);
    }

    // ---- details ----

    #[tokio::test]
    async fn test_course_details() {
        let fx = Fixture::new();
        fx.backend.seed(
            &EntityKind::Course,
            json!({"name": "Math 101", "section": "B", "room": "12", "courseState": "ACTIVE"}),
        );
        let p = params(json!({"courseName": "math"}));
        let r = CourseHandler.execute(&fx.call(Intent::GetCourseDetails, &p, "")).await;
        assert!(r.message().contains("Section: B"));
        assert!(r.message().contains("Room: 12"));
    }
}
