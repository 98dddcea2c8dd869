//! Declarative intent table.
//!
//! One entry per [`Intent`]: what it means, which parameters it needs (and how
//! to ask for them), extraction hints for the model prompt, and who may run it.
//! The model prompt, the pattern extractors, and the completeness check all
//! read from here.

use crate::context::has_value;
use crate::intent::Intent;
use crate::types::{Parameters, UserRole};

/// Parameter keys shared by the classifier and the handlers.
pub mod keys {
    pub const COURSE_NAME: &str = "courseName";
    pub const COURSE_ID: &str = "courseId";
    pub const NEW_NAME: &str = "newName";
    pub const SECTION: &str = "section";
    pub const DESCRIPTION: &str = "description";
    pub const TITLE: &str = "title";
    pub const ASSIGNMENT_TITLE: &str = "assignmentTitle";
    pub const ASSIGNMENT_ID: &str = "assignmentId";
    pub const DUE_DATE: &str = "dueDate";
    pub const DUE_TIME: &str = "dueTime";
    pub const MAX_POINTS: &str = "maxPoints";
    pub const TEXT: &str = "text";
    pub const ANNOUNCEMENT_ID: &str = "announcementId";
    pub const STUDENT_EMAILS: &str = "studentEmails";
    pub const TEACHER_EMAILS: &str = "teacherEmails";
    pub const STUDENT_EMAIL: &str = "studentEmail";
    pub const GRADE: &str = "grade";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const DURATION_MINUTES: &str = "durationMinutes";
    pub const ATTENDEES: &str = "attendees";
    pub const MEETING_ID: &str = "meetingId";
    pub const NEW_DATE: &str = "newDate";
    pub const NEW_TIME: &str = "newTime";
    pub const RECIPIENTS: &str = "recipients";
    pub const SUBJECT: &str = "subject";
    pub const BODY: &str = "body";
}

/// Shape a slot value must have to be recognized in a bare reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    EmailList,
    /// Short name without command structure.
    Name,
    FreeText,
    Date,
    Time,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub shape: ParamShape,
    /// Question asked when the slot is missing.
    pub question: &'static str,
}

/// Minimum role required to run an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePolicy {
    Any,
    TeacherOrAdmin,
    AdminOnly,
}

impl RolePolicy {
    pub fn allows(&self, role: UserRole) -> bool {
        match self {
            RolePolicy::Any => true,
            RolePolicy::TeacherOrAdmin => {
                matches!(role, UserRole::Teacher | UserRole::SuperAdmin)
            }
            RolePolicy::AdminOnly => role == UserRole::SuperAdmin,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntentSpec {
    pub intent: Intent,
    pub description: &'static str,
    pub required: &'static [ParamSpec],
    pub optional: &'static [&'static str],
    /// Example phrasings with the parameters they carry.
    pub hints: &'static [&'static str],
    pub policy: RolePolicy,
}

impl IntentSpec {
    pub fn required_names(&self) -> Vec<&'static str> {
        self.required.iter().map(|p| p.name).collect()
    }

    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.required.iter().find(|p| p.name == name)
    }

    /// Every parameter key this intent understands.
    pub fn accepts(&self, name: &str) -> bool {
        self.required.iter().any(|p| p.name == name) || self.optional.contains(&name)
    }
}

// =============================================================================
// Reusable parameter specs
// =============================================================================

const COURSE: ParamSpec = ParamSpec {
    name: keys::COURSE_NAME,
    shape: ParamShape::Name,
    question: "Which course is this for?",
};

const ASSIGNMENT: ParamSpec = ParamSpec {
    name: keys::ASSIGNMENT_TITLE,
    shape: ParamShape::Name,
    question: "Which assignment do you mean?",
};

const NEW_COURSE_NAME: ParamSpec = ParamSpec {
    name: keys::COURSE_NAME,
    shape: ParamShape::Name,
    question: "What should the new course be called?",
};

const ASSIGNMENT_TITLE: ParamSpec = ParamSpec {
    name: keys::TITLE,
    shape: ParamShape::Name,
    question: "What is the title of the assignment?",
};

const ANNOUNCEMENT_TEXT: ParamSpec = ParamSpec {
    name: keys::TEXT,
    shape: ParamShape::FreeText,
    question: "What should the announcement say?",
};

const STUDENT_EMAILS: ParamSpec = ParamSpec {
    name: keys::STUDENT_EMAILS,
    shape: ParamShape::EmailList,
    question: "Which student email addresses should I use?",
};

const TEACHER_EMAILS: ParamSpec = ParamSpec {
    name: keys::TEACHER_EMAILS,
    shape: ParamShape::EmailList,
    question: "Which teacher email addresses should I invite?",
};

const STUDENT_EMAIL: ParamSpec = ParamSpec {
    name: keys::STUDENT_EMAIL,
    shape: ParamShape::EmailList,
    question: "Which student's submission is this? Please give their email.",
};

const GRADE: ParamSpec = ParamSpec {
    name: keys::GRADE,
    shape: ParamShape::Number,
    question: "What grade should I give?",
};

const MEETING_TITLE: ParamSpec = ParamSpec {
    name: keys::TITLE,
    shape: ParamShape::Name,
    question: "What is the meeting called?",
};

const MEETING_DATE: ParamSpec = ParamSpec {
    name: keys::DATE,
    shape: ParamShape::Date,
    question: "What day is the meeting?",
};

const MEETING_TIME: ParamSpec = ParamSpec {
    name: keys::TIME,
    shape: ParamShape::Time,
    question: "What time does the meeting start?",
};

const RECIPIENTS: ParamSpec = ParamSpec {
    name: keys::RECIPIENTS,
    shape: ParamShape::EmailList,
    question: "Who should I send the email to?",
};

const EMAIL_BODY: ParamSpec = ParamSpec {
    name: keys::BODY,
    shape: ParamShape::FreeText,
    question: "What should the email say?",
};

const NONE: &[ParamSpec] = &[];
const NO_KEYS: &[&str] = &[];

// =============================================================================
// The table
// =============================================================================

const UNKNOWN_SPEC: IntentSpec = IntentSpec {
    intent: Intent::Unknown,
    description: "The message does not match any supported request",
    required: NONE,
    optional: NO_KEYS,
    hints: &[],
    policy: RolePolicy::Any,
};

/// All intents, in the order they are presented to the model.
pub static INTENT_TABLE: &[IntentSpec] = &[
    // ---- Courses ----
    IntentSpec {
        intent: Intent::ListCourses,
        description: "List the user's courses",
        required: NONE,
        optional: NO_KEYS,
        hints: &["list my courses", "show my classes", "what courses do I have"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::CreateCourse,
        description: "Create a new course",
        required: &[NEW_COURSE_NAME],
        optional: &[keys::SECTION, keys::DESCRIPTION],
        hints: &["create a course named Biology 101 -> courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::UpdateCourse,
        description: "Rename or edit an existing course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID, keys::NEW_NAME, keys::SECTION, keys::DESCRIPTION],
        hints: &["rename Biology 101 to Biology 102 -> courseName, newName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::DeleteCourse,
        description: "Delete a course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["delete the course Chemistry -> courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::ArchiveCourse,
        description: "Archive a course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["archive Physics 2 -> courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::GetCourseDetails,
        description: "Show details about one course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["tell me about Math 101 -> courseName", "details for the course History"],
        policy: RolePolicy::Any,
    },
    // ---- Assignments ----
    IntentSpec {
        intent: Intent::ListAssignments,
        description: "List assignments in a course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["show assignments in Math 101 -> courseName"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::CreateAssignment,
        description: "Create an assignment in a course",
        required: &[COURSE, ASSIGNMENT_TITLE],
        optional: &[
            keys::COURSE_ID,
            keys::DESCRIPTION,
            keys::DUE_DATE,
            keys::DUE_TIME,
            keys::MAX_POINTS,
        ],
        hints: &["create an assignment called Essay 1 in English due friday -> title, courseName, dueDate"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::UpdateAssignment,
        description: "Change an assignment's title, due date or points",
        required: &[COURSE, ASSIGNMENT],
        optional: &[
            keys::COURSE_ID,
            keys::ASSIGNMENT_ID,
            keys::NEW_NAME,
            keys::DUE_DATE,
            keys::DUE_TIME,
            keys::MAX_POINTS,
        ],
        hints: &["move the due date of Essay 1 in English to monday -> assignmentTitle, courseName, dueDate"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::DeleteAssignment,
        description: "Delete an assignment",
        required: &[COURSE, ASSIGNMENT],
        optional: &[keys::COURSE_ID, keys::ASSIGNMENT_ID],
        hints: &["delete the assignment Quiz 3 in Math 101 -> assignmentTitle, courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    // ---- Announcements ----
    IntentSpec {
        intent: Intent::ListAnnouncements,
        description: "List announcements in a course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["show announcements for Math 101 -> courseName"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::CreateAnnouncement,
        description: "Post an announcement to a course",
        required: &[COURSE, ANNOUNCEMENT_TEXT],
        optional: &[keys::COURSE_ID],
        hints: &["announce to Math 101 that class is cancelled -> courseName, text"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::DeleteAnnouncement,
        description: "Delete an announcement whose text matches",
        required: &[COURSE, ANNOUNCEMENT_TEXT],
        optional: &[keys::COURSE_ID, keys::ANNOUNCEMENT_ID],
        hints: &["delete the announcement about the field trip in Math 101 -> text, courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    // ---- Roster ----
    IntentSpec {
        intent: Intent::ShowRoster,
        description: "List the students enrolled in a course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["who is in Math 101 -> courseName", "show the roster for History"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::ListTeachers,
        description: "List the teachers of a course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["who teaches Math 101 -> courseName"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::InviteStudents,
        description: "Invite students to a course by email",
        required: &[STUDENT_EMAILS, COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["invite a@x.com and b@x.com to Math 101 -> studentEmails, courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::InviteTeachers,
        description: "Invite co-teachers to a course by email",
        required: &[TEACHER_EMAILS, COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["add teacher t@x.com to Math 101 -> teacherEmails, courseName"],
        policy: RolePolicy::AdminOnly,
    },
    IntentSpec {
        intent: Intent::RemoveStudent,
        description: "Remove students from a course",
        required: &[STUDENT_EMAILS, COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["remove a@x.com from Math 101 -> studentEmails, courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::ListInvitations,
        description: "List open invitations for a course",
        required: &[COURSE],
        optional: &[keys::COURSE_ID],
        hints: &["show pending invitations for Math 101 -> courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    // ---- Grades ----
    IntentSpec {
        intent: Intent::ShowGrades,
        description: "Show grades in a course, optionally for one assignment",
        required: &[COURSE],
        optional: &[keys::COURSE_ID, keys::ASSIGNMENT_TITLE],
        hints: &["show grades for Essay 1 in English -> assignmentTitle, courseName"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::ListSubmissions,
        description: "List student submissions for an assignment",
        required: &[COURSE, ASSIGNMENT],
        optional: &[keys::COURSE_ID, keys::ASSIGNMENT_ID],
        hints: &["show submissions for Essay 1 in English -> assignmentTitle, courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::GradeSubmission,
        description: "Assign a grade to a student's submission",
        required: &[COURSE, ASSIGNMENT, STUDENT_EMAIL, GRADE],
        optional: &[keys::COURSE_ID, keys::ASSIGNMENT_ID],
        hints: &["give a@x.com 90 on Essay 1 in English -> studentEmail, grade, assignmentTitle, courseName"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    // ---- Meetings ----
    IntentSpec {
        intent: Intent::ListMeetings,
        description: "List upcoming meetings",
        required: NONE,
        optional: &[keys::DATE],
        hints: &["show my meetings", "what meetings do I have tomorrow -> date"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::CreateMeeting,
        description: "Schedule a meeting",
        required: &[MEETING_TITLE, MEETING_DATE, MEETING_TIME],
        optional: &[keys::DURATION_MINUTES, keys::ATTENDEES, keys::DESCRIPTION],
        hints: &["schedule a meeting called Office Hours tomorrow at 3pm -> title, date, time"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::UpdateMeeting,
        description: "Move or rename a meeting",
        required: &[MEETING_TITLE],
        optional: &[keys::MEETING_ID, keys::NEW_DATE, keys::NEW_TIME, keys::NEW_NAME],
        hints: &["move the meeting Office Hours to friday at 2pm -> title, newDate, newTime"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::DeleteMeeting,
        description: "Cancel a meeting",
        required: &[MEETING_TITLE],
        optional: &[keys::MEETING_ID],
        hints: &["delete the meeting Office Hours -> title"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    // ---- Email ----
    IntentSpec {
        intent: Intent::SendEmail,
        description: "Send an email",
        required: &[RECIPIENTS, EMAIL_BODY],
        optional: &[keys::SUBJECT],
        hints: &["email a@x.com saying the test moved -> recipients, body"],
        policy: RolePolicy::TeacherOrAdmin,
    },
    IntentSpec {
        intent: Intent::ListEmails,
        description: "List recent emails",
        required: NONE,
        optional: NO_KEYS,
        hints: &["show my recent emails"],
        policy: RolePolicy::Any,
    },
    // ---- Conversational ----
    IntentSpec {
        intent: Intent::Greeting,
        description: "Hello or similar",
        required: NONE,
        optional: NO_KEYS,
        hints: &["hi", "good morning"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::Thanks,
        description: "Thanks or similar",
        required: NONE,
        optional: NO_KEYS,
        hints: &["thanks", "thank you"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::Help,
        description: "The user asks for help",
        required: NONE,
        optional: NO_KEYS,
        hints: &["help", "how does this work"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::CapabilityQuestion,
        description: "The user asks what the assistant can do",
        required: NONE,
        optional: NO_KEYS,
        hints: &["what can you do", "can you grade essays?"],
        policy: RolePolicy::Any,
    },
    IntentSpec {
        intent: Intent::Cancel,
        description: "Abandon the current request",
        required: NONE,
        optional: NO_KEYS,
        hints: &["cancel", "never mind", "stop"],
        policy: RolePolicy::Any,
    },
    UNKNOWN_SPEC,
];

/// Table entry for `intent`.
pub fn spec_for(intent: Intent) -> &'static IntentSpec {
    INTENT_TABLE
        .iter()
        .find(|s| s.intent == intent)
        .unwrap_or(&UNKNOWN_SPEC)
}

/// Required parameters of `intent` not present in `params`, in table order.
pub fn missing_parameters(intent: Intent, params: &Parameters) -> Vec<&'static str> {
    spec_for(intent)
        .required
        .iter()
        .filter(|p| !has_value(params, p.name))
        .map(|p| p.name)
        .collect()
}

/// Question to ask for a missing parameter.
pub fn question_for(intent: Intent, param: &str) -> String {
    spec_for(intent)
        .param(param)
        .map(|p| p.question.to_string())
        .unwrap_or_else(|| format!("Could you tell me the {}?", param))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_intent_has_exactly_one_entry() {
        for intent in Intent::ALL {
            let count = INTENT_TABLE.iter().filter(|s| s.intent == intent).count();
            assert_eq!(count, 1, "{} should appear once", intent);
        }
        assert_eq!(INTENT_TABLE.len(), Intent::ALL.len());
    }

    #[test]
    fn test_conversational_intents_need_nothing() {
        for spec in INTENT_TABLE.iter().filter(|s| s.intent.is_conversational()) {
            assert!(spec.required.is_empty());
            assert_eq!(spec.policy, RolePolicy::Any);
        }
    }

    #[test]
    fn test_list_courses_has_no_required_params() {
        assert!(spec_for(Intent::ListCourses).required.is_empty());
    }

    #[test]
    fn test_missing_parameters_in_table_order() {
        let params = json!({"courseName": "Math"}).as_object().cloned().unwrap();
        assert_eq!(
            missing_parameters(Intent::GradeSubmission, &params),
            vec!["assignmentTitle", "studentEmail", "grade"]
        );
        assert!(missing_parameters(Intent::ListCourses, &Parameters::new()).is_empty());
    }

    #[test]
    fn test_question_for_known_and_unknown_param() {
        assert_eq!(
            question_for(Intent::CreateAnnouncement, keys::TEXT),
            "What should the announcement say?"
        );
        assert_eq!(
            question_for(Intent::CreateAnnouncement, "mood"),
            "Could you tell me the mood?"
        );
    }

    #[test]
    fn test_role_policies() {
        assert!(RolePolicy::Any.allows(UserRole::Student));
        assert!(!RolePolicy::TeacherOrAdmin.allows(UserRole::Student));
        assert!(RolePolicy::TeacherOrAdmin.allows(UserRole::Teacher));
        assert!(RolePolicy::TeacherOrAdmin.allows(UserRole::SuperAdmin));
        assert!(!RolePolicy::AdminOnly.allows(UserRole::Teacher));
        assert!(RolePolicy::AdminOnly.allows(UserRole::SuperAdmin));
    }

    #[test]
    fn test_invitation_policies() {
        assert_eq!(spec_for(Intent::InviteStudents).policy, RolePolicy::TeacherOrAdmin);
        assert_eq!(spec_for(Intent::InviteTeachers).policy, RolePolicy::AdminOnly);
    }

    #[test]
    fn test_accepts_required_and_optional() {
        let spec = spec_for(Intent::CreateAssignment);
        assert!(spec.accepts(keys::TITLE));
        assert!(spec.accepts(keys::DUE_DATE));
        assert!(!spec.accepts(keys::RECIPIENTS));
    }
}
