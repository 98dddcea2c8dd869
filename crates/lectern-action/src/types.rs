//! Core types for the action engine.
//!
//! Backend entities and their kinds, plus the four-way response every
//! handler produces.

use std::collections::BTreeMap;
use std::fmt;

use lectern_core::context::{EntityOption, OngoingAction, PendingAction};
use serde::Serialize;
use serde_json::Value;

// =============================================================================
// Entities
// =============================================================================

/// Kind of record a backend call addresses. Child kinds carry their parent ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Course,
    Assignment { course_id: String },
    Announcement { course_id: String },
    Student { course_id: String },
    Teacher { course_id: String },
    Invitation { course_id: Option<String> },
    Submission { course_id: String, assignment_id: String },
    Meeting,
    Email,
}

impl EntityKind {
    /// Collection path relative to the owning service's base URL.
    pub fn path(&self) -> String {
        match self {
            EntityKind::Course => "courses".to_string(),
            EntityKind::Assignment { course_id } => format!("courses/{}/courseWork", course_id),
            EntityKind::Announcement { course_id } => {
                format!("courses/{}/announcements", course_id)
            }
            EntityKind::Student { course_id } => format!("courses/{}/students", course_id),
            EntityKind::Teacher { course_id } => format!("courses/{}/teachers", course_id),
            EntityKind::Invitation { .. } => "invitations".to_string(),
            EntityKind::Submission {
                course_id,
                assignment_id,
            } => format!(
                "courses/{}/courseWork/{}/studentSubmissions",
                course_id, assignment_id
            ),
            EntityKind::Meeting => "calendars/primary/events".to_string(),
            EntityKind::Email => "users/me/messages".to_string(),
        }
    }

    /// Field holding the array in a list response.
    pub fn list_field(&self) -> &'static str {
        match self {
            EntityKind::Course => "courses",
            EntityKind::Assignment { .. } => "courseWork",
            EntityKind::Announcement { .. } => "announcements",
            EntityKind::Student { .. } => "students",
            EntityKind::Teacher { .. } => "teachers",
            EntityKind::Invitation { .. } => "invitations",
            EntityKind::Submission { .. } => "studentSubmissions",
            EntityKind::Meeting => "items",
            EntityKind::Email => "messages",
        }
    }

    /// Short name used in logs and call counters.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Course => "course",
            EntityKind::Assignment { .. } => "assignment",
            EntityKind::Announcement { .. } => "announcement",
            EntityKind::Student { .. } => "student",
            EntityKind::Teacher { .. } => "teacher",
            EntityKind::Invitation { .. } => "invitation",
            EntityKind::Submission { .. } => "submission",
            EntityKind::Meeting => "meeting",
            EntityKind::Email => "email",
        }
    }

    fn is_person(&self) -> bool {
        matches!(self, EntityKind::Student { .. } | EntityKind::Teacher { .. })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A record returned by a backend collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub display_name: String,
    /// Full backend representation.
    pub raw: Value,
}

const NAME_FIELDS: &[&str] = &["name", "title", "summary", "subject", "text", "snippet"];

impl Entity {
    /// Build from a backend JSON object, picking the id and a human name.
    pub fn from_json(kind: &EntityKind, raw: Value) -> Self {
        let id = if kind.is_person() {
            string_field(&raw, "userId").or_else(|| string_field(&raw, "id"))
        } else {
            string_field(&raw, "id")
        }
        .unwrap_or_default();

        let display_name = if kind.is_person() {
            raw.pointer("/profile/name/fullName")
                .and_then(Value::as_str)
                .or_else(|| raw.pointer("/profile/emailAddress").and_then(Value::as_str))
                .map(str::to_string)
        } else {
            NAME_FIELDS.iter().find_map(|f| string_field(&raw, f))
        }
        .unwrap_or_else(|| id.clone());

        Self {
            id,
            display_name,
            raw,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(Value::as_str)
    }

    /// Email of a roster member, when the backend included a profile.
    pub fn email(&self) -> Option<&str> {
        self.raw
            .pointer("/profile/emailAddress")
            .and_then(Value::as_str)
    }

    /// Option shown to the user when several entities match.
    pub fn to_option(&self) -> EntityOption {
        let mut attributes = BTreeMap::new();
        if let Some(section) = self.field("section") {
            attributes.insert("section".to_string(), section.to_string());
        }
        if let Some(state) = self.field("courseState").or_else(|| self.field("state")) {
            attributes.insert("state".to_string(), state.to_string());
        }
        if let Some(start) = self.raw.pointer("/start/dateTime").and_then(Value::as_str) {
            attributes.insert("starts".to_string(), start.to_string());
        }
        if let Some(created) = self.field("creationTime") {
            attributes.insert("created".to_string(), created.to_string());
        }
        EntityOption {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            attributes,
        }
    }
}

fn string_field(raw: &Value, name: &str) -> Option<String> {
    match raw.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Responses
// =============================================================================

/// User-visible failure category carried by [`OrchestratorResponse::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The caller's role may not run this intent.
    Unauthorized,
    /// The backend refused the call for this user.
    Forbidden,
    NotFound,
    /// Remote state blocks the operation and an administrator has to act.
    PreconditionManual,
    Transient,
    Rejected,
    InvalidInput,
}

impl FailureKind {
    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::Forbidden => write!(f, "forbidden"),
            FailureKind::NotFound => write!(f, "not_found"),
            FailureKind::PreconditionManual => write!(f, "precondition_manual"),
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::InvalidInput => write!(f, "invalid_input"),
        }
    }
}

/// Outcome of one orchestrated action.
///
/// The pending and ongoing actions are carried for the state store and never
/// serialized to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrchestratorResponse {
    Completed {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    NeedsDisambiguation {
        message: String,
        options: Vec<EntityOption>,
        #[serde(skip)]
        pending: PendingAction,
    },
    NeedsParameter {
        message: String,
        #[serde(rename = "missingParameters")]
        missing_parameters: Vec<String>,
        #[serde(skip)]
        ongoing: OngoingAction,
    },
    Failed {
        message: String,
        error: FailureKind,
    },
}

impl OrchestratorResponse {
    pub fn completed(message: impl Into<String>) -> Self {
        OrchestratorResponse::Completed {
            message: message.into(),
            data: None,
        }
    }

    pub fn completed_with(message: impl Into<String>, data: Value) -> Self {
        OrchestratorResponse::Completed {
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(error: FailureKind, message: impl Into<String>) -> Self {
        OrchestratorResponse::Failed {
            message: message.into(),
            error,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            OrchestratorResponse::Completed { message, .. }
            | OrchestratorResponse::NeedsDisambiguation { message, .. }
            | OrchestratorResponse::NeedsParameter { message, .. }
            | OrchestratorResponse::Failed { message, .. } => message,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            OrchestratorResponse::Completed { .. } => "completed",
            OrchestratorResponse::NeedsDisambiguation { .. } => "needs_disambiguation",
            OrchestratorResponse::NeedsParameter { .. } => "needs_parameter",
            OrchestratorResponse::Failed { .. } => "failed",
        }
    }

    /// Completed and failed responses end the dialogue for this action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorResponse::Completed { .. } | OrchestratorResponse::Failed { .. }
        )
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            OrchestratorResponse::Failed { error, .. } => Some(*error),
            _ => None,
        }
    }
}

/// Numbered list used in disambiguation questions.
pub fn numbered_options(options: &[EntityOption]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. {}", i + 1, o.label()))
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Tests
// =============================================================================
