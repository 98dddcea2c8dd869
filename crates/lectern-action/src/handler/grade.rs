//! Grades and submissions.

use std::collections::HashMap;

use async_trait::async_trait;
use lectern_core::intent::Intent;
use lectern_core::taxonomy::keys;
use serde_json::{json, Value};

use super::assignment::resolve_assignment;
use super::{plural, resolve_course, ActionCall, ActionHandler, BackendResultExt, Step};
use crate::types::{Entity, EntityKind, FailureKind, OrchestratorResponse};

pub struct GradeHandler;

#[async_trait]
impl ActionHandler for GradeHandler {
    fn intents(&self) -> &'static [Intent] {
        &[
            Intent::ShowGrades,
            Intent::ListSubmissions,
            Intent::GradeSubmission,
        ]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let step = match call.intent {
            Intent::ShowGrades => show_grades(call).await,
            Intent::ListSubmissions => list_submissions(call).await,
            _ => grade_submission(call).await,
        };
        step.unwrap_or_else(|response| response)
    }
}

fn submission_kind(course: &Entity, assignment: &Entity) -> EntityKind {
    EntityKind::Submission {
        course_id: course.id.clone(),
        assignment_id: assignment.id.clone(),
    }
}

fn assigned_grade(submission: &Entity) -> Option<f64> {
    submission.raw.get("assignedGrade").and_then(Value::as_f64)
}

/// "90" for whole numbers, "87.5" otherwise.
fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{}", points as i64)
    } else {
        format!("{:.1}", points)
    }
}

/// userId -> display name for everyone enrolled in `course`.
async fn student_names(call: &ActionCall<'_>, course: &Entity) -> Step<HashMap<String, String>> {
    let students = call
        .backend
        .list(
            call.token,
            &EntityKind::Student {
                course_id: course.id.clone(),
            },
        )
        .await
        .or_fail(call.intent)?;
    Ok(students
        .into_iter()
        .map(|s| (s.id, s.display_name))
        .collect())
}

fn student_label<'a>(names: &'a HashMap<String, String>, submission: &'a Entity) -> &'a str {
    let user_id = submission.field("userId").unwrap_or(&submission.id);
    names.get(user_id).map(String::as_str).unwrap_or(user_id)
}

async fn show_grades(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    if call.str_param(keys::ASSIGNMENT_TITLE).is_some() || call.str_param(keys::ASSIGNMENT_ID).is_some() {
        return grades_for_assignment(call, &course).await;
    }

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

    let mut lines = Vec::with_capacity(assignments.len());
    for assignment in &assignments {
        let submissions = call
            .backend
            .list(call.token, &submission_kind(&course, assignment))
            .await
            .or_fail(call.intent)?;
        let grades: Vec<f64> = submissions.iter().filter_map(assigned_grade).collect();
        let line = if grades.is_empty() {
            format!("- {}: no grades yet", assignment.display_name)
        } else {
            let average = grades.iter().sum::<f64>() / grades.len() as f64;
            format!(
                "- {}: {} of {} graded, average {}",
                assignment.display_name,
                grades.len(),
                submissions.len(),
                format_points(average)
            )
        };
        lines.push(line);
    }

    Ok(OrchestratorResponse::completed_with(
        format!("Grades in \"{}\":\n{}", course.display_name, lines.join("\n")),
        json!({"assignments": assignments.len()}),
    ))
}

async fn grades_for_assignment(call: &ActionCall<'_>, course: &Entity) -> Step<OrchestratorResponse> {
    let assignment = resolve_assignment(call, course).await?;
    let submissions = call
        .backend
        .list(call.token, &submission_kind(course, &assignment))
        .await
        .or_fail(call.intent)?;
    if submissions.is_empty() {
        return Ok(OrchestratorResponse::completed(format!(
            "Nobody has submitted \"{}\" yet.",
            assignment.display_name
        )));
    }

    let names = student_names(call, course).await?;
    let max_points = assignment.raw.get("maxPoints").and_then(Value::as_f64);
    let lines: Vec<String> = submissions
        .iter()
        .map(|s| {
            let who = student_label(&names, s);
            match (assigned_grade(s), max_points) {
                (Some(g), Some(max)) => format!("- {}: {}/{}", who, format_points(g), format_points(max)),
                (Some(g), None) => format!("- {}: {}", who, format_points(g)),
                (None, _) => format!("- {}: not graded", who),
            }
        })
        .collect();
    Ok(OrchestratorResponse::completed(format!(
        "Grades for \"{}\" in \"{}\":\n{}",
        assignment.display_name,
        course.display_name,
        lines.join("\n")
    )))
}

async fn list_submissions(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let course = resolve_course(call).await?;
    let assignment = resolve_assignment(call, &course).await?;
    let submissions = call
        .backend
        .list(call.token, &submission_kind(&course, &assignment))
        .await
        .or_fail(call.intent)?;
    if submissions.is_empty() {
        return Ok(OrchestratorResponse::completed(format!(
            "There are no submissions for \"{}\" yet.",
            assignment.display_name
        )));
    }

    let names = student_names(call, &course).await?;
    let lines: Vec<String> = submissions
        .iter()
        .map(|s| {
            let state = s.field("state").unwrap_or("NEW").to_lowercase().replace('_', " ");
            format!("- {} ({})", student_label(&names, s), state)
        })
        .collect();
    Ok(OrchestratorResponse::completed_with(
        format!(
            "\"{}\" has {}:\n{}",
            assignment.display_name,
            plural(submissions.len(), "submission"),
            lines.join("\n")
        ),
        json!({"count": submissions.len()}),
    ))
}

async fn grade_submission(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let Some(email) = call.str_param(keys::STUDENT_EMAIL) else {
        return Err(call.ask_for(keys::STUDENT_EMAIL));
    };
    let grade = match call.number_param(keys::GRADE) {
        Some(g) if g >= 0.0 => g,
        Some(_) => {
            return Err(OrchestratorResponse::failed(
                FailureKind::InvalidInput,
                "Grades can't be negative.",
            ))
        }
        None if call.params.contains_key(keys::GRADE) => {
            return Err(OrchestratorResponse::failed(
                FailureKind::InvalidInput,
                "The grade needs to be a number.",
            ))
        }
        None => return Err(call.ask_for(keys::GRADE)),
    };

    let course = resolve_course(call).await?;
    let assignment = resolve_assignment(call, &course).await?;
    if let Some(max) = assignment.raw.get("maxPoints").and_then(Value::as_f64) {
        if grade > max {
            return Err(OrchestratorResponse::failed(
                FailureKind::InvalidInput,
                format!(
                    "\"{}\" is worth at most {} points.",
                    assignment.display_name,
                    format_points(max)
                ),
            ));
        }
    }

    let students = call
        .backend
        .list(
            call.token,
            &EntityKind::Student {
                course_id: course.id.clone(),
            },
        )
        .await
        .or_fail(call.intent)?;
    let Some(student) = students
        .iter()
        .find(|s| s.email().is_some_and(|e| e.eq_ignore_ascii_case(email)))
    else {
        return Err(OrchestratorResponse::failed(
            FailureKind::NotFound,
            format!("{} isn't enrolled in \"{}\".", email, course.display_name),
        ));
    };

    let kind = submission_kind(&course, &assignment);
    let submissions = call.backend.list(call.token, &kind).await.or_fail(call.intent)?;
    let Some(submission) = submissions
        .iter()
        .find(|s| s.field("userId") == Some(student.id.as_str()))
    else {
        return Err(OrchestratorResponse::failed(
            FailureKind::NotFound,
            format!(
                "{} has no submission for \"{}\".",
                student.display_name, assignment.display_name
            ),
        ));
    };

    call.backend
        .patch(
            call.token,
            &kind,
            &submission.id,
            json!({"assignedGrade": grade, "draftGrade": grade}),
        )
        .await
        .or_fail(call.intent)?;

    Ok(OrchestratorResponse::completed_with(
        format!(
            "Gave {} {} on \"{}\".",
            student.display_name,
            format_points(grade),
            assignment.display_name
        ),
        json!({"submissionId": submission.id, "grade": grade}),
    ))
}
