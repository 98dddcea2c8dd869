//! Intent names and the per-turn classification result.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Parameters;

/// Every request category the assistant understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    // Courses
    ListCourses,
    CreateCourse,
    UpdateCourse,
    DeleteCourse,
    ArchiveCourse,
    GetCourseDetails,
    // Assignments
    ListAssignments,
    CreateAssignment,
    UpdateAssignment,
    DeleteAssignment,
    // Announcements
    ListAnnouncements,
    CreateAnnouncement,
    DeleteAnnouncement,
    // Roster
    ShowRoster,
    ListTeachers,
    InviteStudents,
    InviteTeachers,
    RemoveStudent,
    ListInvitations,
    // Grades
    ShowGrades,
    ListSubmissions,
    GradeSubmission,
    // Meetings
    ListMeetings,
    CreateMeeting,
    UpdateMeeting,
    DeleteMeeting,
    // Email
    SendEmail,
    ListEmails,
    // Conversational
    Greeting,
    Thanks,
    Help,
    CapabilityQuestion,
    Cancel,
    Unknown,
}

impl Intent {
    /// All intents in taxonomy order.
    pub const ALL: [Intent; 34] = [
        Intent::ListCourses,
        Intent::CreateCourse,
        Intent::UpdateCourse,
        Intent::DeleteCourse,
        Intent::ArchiveCourse,
        Intent::GetCourseDetails,
        Intent::ListAssignments,
        Intent::CreateAssignment,
        Intent::UpdateAssignment,
        Intent::DeleteAssignment,
        Intent::ListAnnouncements,
        Intent::CreateAnnouncement,
        Intent::DeleteAnnouncement,
        Intent::ShowRoster,
        Intent::ListTeachers,
        Intent::InviteStudents,
        Intent::InviteTeachers,
        Intent::RemoveStudent,
        Intent::ListInvitations,
        Intent::ShowGrades,
        Intent::ListSubmissions,
        Intent::GradeSubmission,
        Intent::ListMeetings,
        Intent::CreateMeeting,
        Intent::UpdateMeeting,
        Intent::DeleteMeeting,
        Intent::SendEmail,
        Intent::ListEmails,
        Intent::Greeting,
        Intent::Thanks,
        Intent::Help,
        Intent::CapabilityQuestion,
        Intent::Cancel,
        Intent::Unknown,
    ];

    /// Wire name, e.g. `LIST_COURSES`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ListCourses => "LIST_COURSES",
            Intent::CreateCourse => "CREATE_COURSE",
            Intent::UpdateCourse => "UPDATE_COURSE",
            Intent::DeleteCourse => "DELETE_COURSE",
            Intent::ArchiveCourse => "ARCHIVE_COURSE",
            Intent::GetCourseDetails => "GET_COURSE_DETAILS",
            Intent::ListAssignments => "LIST_ASSIGNMENTS",
            Intent::CreateAssignment => "CREATE_ASSIGNMENT",
            Intent::UpdateAssignment => "UPDATE_ASSIGNMENT",
            Intent::DeleteAssignment => "DELETE_ASSIGNMENT",
            Intent::ListAnnouncements => "LIST_ANNOUNCEMENTS",
            Intent::CreateAnnouncement => "CREATE_ANNOUNCEMENT",
            Intent::DeleteAnnouncement => "DELETE_ANNOUNCEMENT",
            Intent::ShowRoster => "SHOW_ROSTER",
            Intent::ListTeachers => "LIST_TEACHERS",
            Intent::InviteStudents => "INVITE_STUDENTS",
            Intent::InviteTeachers => "INVITE_TEACHERS",
            Intent::RemoveStudent => "REMOVE_STUDENT",
            Intent::ListInvitations => "LIST_INVITATIONS",
            Intent::ShowGrades => "SHOW_GRADES",
            Intent::ListSubmissions => "LIST_SUBMISSIONS",
            Intent::GradeSubmission => "GRADE_SUBMISSION",
            Intent::ListMeetings => "LIST_MEETINGS",
            Intent::CreateMeeting => "CREATE_MEETING",
            Intent::UpdateMeeting => "UPDATE_MEETING",
            Intent::DeleteMeeting => "DELETE_MEETING",
            Intent::SendEmail => "SEND_EMAIL",
            Intent::ListEmails => "LIST_EMAILS",
            Intent::Greeting => "GREETING",
            Intent::Thanks => "THANKS",
            Intent::Help => "HELP",
            Intent::CapabilityQuestion => "CAPABILITY_QUESTION",
            Intent::Cancel => "CANCEL",
            Intent::Unknown => "UNKNOWN",
        }
    }

    /// Intents that only talk, never touch a backend.
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            Intent::Greeting
                | Intent::Thanks
                | Intent::Help
                | Intent::CapabilityQuestion
                | Intent::Cancel
                | Intent::Unknown
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    /// Accepts the wire name in any case, with `-` or spaces for `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Intent::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == normalized)
            .ok_or_else(|| format!("Unknown intent: {}", s))
    }
}

/// Which classifier stage produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Correction,
    Continuation,
    Model,
    Pattern,
    /// Produced by the dialogue layer itself (cancel, pending resolution).
    Dialogue,
}

impl fmt::Display for IntentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentSource::Correction => write!(f, "correction"),
            IntentSource::Continuation => write!(f, "continuation"),
            IntentSource::Model => write!(f, "model"),
            IntentSource::Pattern => write!(f, "pattern"),
            IntentSource::Dialogue => write!(f, "dialogue"),
        }
    }
}

/// Outcome of classifying one utterance. Never persisted as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f32,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_correction: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_parameter_collection: bool,
    pub source: IntentSource,
}

impl IntentResult {
    /// Build a result, clamping confidence into `[0, 1]`.
    pub fn new(intent: Intent, confidence: f32, parameters: Parameters, source: IntentSource) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            intent,
            confidence,
            parameters,
            is_correction: false,
            is_parameter_collection: false,
            source,
        }
    }

    /// The deterministic "nothing matched" result.
    pub fn unknown() -> Self {
        Self::new(Intent::Unknown, 0.5, Parameters::new(), IntentSource::Pattern)
    }

    /// String parameter, trimmed; empty strings count as absent.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_roundtrip_all() {
        for intent in Intent::ALL {
            let parsed: Intent = intent.as_str().parse().unwrap();
            assert_eq!(parsed, intent);
            assert_eq!(intent.to_string(), intent.as_str());
        }
    }

    #[test]
    fn test_intent_parse_is_lenient() {
        assert_eq!("list_courses".parse::<Intent>().unwrap(), Intent::ListCourses);
        assert_eq!("invite-students".parse::<Intent>().unwrap(), Intent::InviteStudents);
        assert_eq!(" create meeting ".parse::<Intent>().unwrap(), Intent::CreateMeeting);
        assert!("launch_rocket".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_serde_uses_wire_name() {
        let json = serde_json::to_string(&Intent::GetCourseDetails).unwrap();
        assert_eq!(json, "\"GET_COURSE_DETAILS\"");
        let parsed: Intent = serde_json::from_str("\"SHOW_ROSTER\"").unwrap();
        assert_eq!(parsed, Intent::ShowRoster);
    }

    #[test]
    fn test_all_is_unique() {
        for (i, a) in Intent::ALL.iter().enumerate() {
            for b in &Intent::ALL[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_conversational_intents() {
        assert!(Intent::Greeting.is_conversational());
        assert!(Intent::Cancel.is_conversational());
        assert!(!Intent::ListCourses.is_conversational());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let r = IntentResult::new(Intent::Help, 1.7, Parameters::new(), IntentSource::Model);
        assert_eq!(r.confidence, 1.0);
        let r = IntentResult::new(Intent::Help, -0.2, Parameters::new(), IntentSource::Model);
        assert_eq!(r.confidence, 0.0);
        let r = IntentResult::new(Intent::Help, f32::NAN, Parameters::new(), IntentSource::Model);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn test_param_str_ignores_blank() {
        let mut params = Parameters::new();
        params.insert("courseName".into(), serde_json::json!("  "));
        params.insert("title".into(), serde_json::json!(" Essay 1 "));
        let r = IntentResult::new(Intent::CreateAssignment, 0.9, params, IntentSource::Pattern);
        assert_eq!(r.param_str("courseName"), None);
        assert_eq!(r.param_str("title"), Some("Essay 1"));
        assert_eq!(r.param_str("missing"), None);
    }

    #[test]
    fn test_intent_result_json_shape() {
        let r = IntentResult::unknown();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["intent"], "UNKNOWN");
        assert!(json.get("isCorrection").is_none());
        assert_eq!(json["source"], "pattern");
    }
}
