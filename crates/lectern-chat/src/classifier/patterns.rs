//! Deterministic pattern classifier.
//!
//! An ordered list of rules over the lowercased message; the first rule that
//! matches wins. Conversational rules are anchored to the whole message.
//! Destructive, update and list rules come before the create rules so that
//! "show my meetings" never reads as a request to schedule one.

use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use lectern_core::intent::{Intent, IntentResult, IntentSource};
use regex::Regex;

use super::extract::extract_for;

/// One `(predicate, intent)` rule; parameters come from the intent's
/// extractors.
pub struct PatternRule {
    pub intent: Intent,
    pub confidence: f32,
    pattern: Regex,
}

impl PatternRule {
    fn new(intent: Intent, confidence: f32, pattern: &str) -> Self {
        Self {
            intent,
            confidence,
            pattern: Regex::new(pattern).expect("Invalid pattern rule regex"),
        }
    }

    pub fn matches(&self, lowered: &str) -> bool {
        self.pattern.is_match(lowered)
    }
}

/// A bare cancel, allowing a short lead-in ("no, cancel that") and a
/// trailing "please".
const CANCEL: &str = r"^\s*(?:(?:no|nope|oh|ok|okay|actually|wait|please|just|hmm|um)\b[\s,.!]*){0,3}(?:cancel|never\s*mind|nevermind|stop|forget\s+(?:it|that|about\s+it)|abort|quit)(?:\s+(?:it|that|this))?(?:[\s,]+please)?\s*[.!]*\s*$";

static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    use Intent::*;
    vec![
        // ---- Conversational, whole message ----
        PatternRule::new(Cancel, 0.95, CANCEL),
        PatternRule::new(
            Greeting,
            0.9,
            r"^\s*(?:hi|hello|hey|howdy|good\s+(?:morning|afternoon|evening))(?:\s+there)?\s*[!.,]*\s*$",
        ),
        PatternRule::new(
            Thanks,
            0.9,
            r"^\s*(?:thanks|thank\s+you|thx|cheers)(?:\s+(?:so\s+much|a\s+lot|again))?\s*[!.]*\s*$",
        ),
        PatternRule::new(
            Help,
            0.85,
            r"^\s*(?:help|help\s+me|i\s+need\s+help|how\s+does\s+this\s+work)\s*[?!.]*\s*$",
        ),
        // ---- Destructive ----
        PatternRule::new(DeleteAnnouncement, 0.85, r"\b(?:delete|remove)\b.*\bannouncements?\b"),
        PatternRule::new(DeleteAssignment, 0.85, r"\b(?:delete|remove)\b.*\b(?:assignments?|homework|quiz)\b"),
        PatternRule::new(
            DeleteMeeting,
            0.85,
            r"\b(?:delete|cancel|remove)\b.*\b(?:meetings?|events?|appointments?)\b",
        ),
        PatternRule::new(
            RemoveStudent,
            0.85,
            r"\b(?:remove|drop|unenroll|kick\s+out)\b.*(?:@|\bstudents?\b)",
        ),
        PatternRule::new(DeleteCourse, 0.85, r"\b(?:delete|remove)\b.*\b(?:course|class)\b"),
        PatternRule::new(ArchiveCourse, 0.85, r"\barchive\b"),
        // ---- Updates ----
        PatternRule::new(
            UpdateAssignment,
            0.8,
            r"\b(?:change|move|update|push|extend|postpone|rename|edit)\b.*\b(?:due\s+date|deadline|assignment|homework)\b",
        ),
        PatternRule::new(
            UpdateMeeting,
            0.8,
            r"\breschedule\b|\b(?:move|rename|change|update|push|postpone)\b.*\b(?:meeting|event|appointment)\b",
        ),
        PatternRule::new(UpdateCourse, 0.8, r"\brename\b|\b(?:change|update|edit)\b.*\b(?:course|class)\b"),
        // ---- Grading ----
        PatternRule::new(GradeSubmission, 0.85, r"\b(?:give|grade|score|mark)\b.*@.*\d"),
        // ---- Lists and lookups ----
        PatternRule::new(
            ListSubmissions,
            0.8,
            r"\bsubmissions?\b|\bturned\s+in\b|\bwho\s+(?:has\s+)?submitted\b",
        ),
        PatternRule::new(ShowGrades, 0.8, r"\bgrades\b|\bscores\b|\bgradebook\b|\bmy\s+grade\b"),
        PatternRule::new(
            ListInvitations,
            0.8,
            r"\b(?:pending|open|outstanding|list|show|view|see|any)\b.*\binvit(?:ations?|es)\b",
        ),
        PatternRule::new(
            ListTeachers,
            0.8,
            r"\bwho\s+teaches\b|\b(?:list|show|see|who\s+are)\b.*\bteachers\b",
        ),
        PatternRule::new(
            ShowRoster,
            0.8,
            r"\broster\b|\bwho(?:'s|\s+is|\s+are)\s+(?:in|enrolled)\b|\b(?:list|show|see|view)\b.*\bstudents\b|\benrolled\b",
        ),
        PatternRule::new(
            ListAnnouncements,
            0.8,
            r"\b(?:list|show|see|view|get|what|any|read|recent)\b.*\bannouncements?\b",
        ),
        PatternRule::new(
            ListAssignments,
            0.8,
            r"\b(?:list|show|see|view|get|what|which|any)\b.*\b(?:assignments|homework|coursework)\b",
        ),
        PatternRule::new(
            ListMeetings,
            0.85,
            r"\b(?:list|show|see|view|get|what|which|any|do\s+i\s+have)\b.*\b(?:meetings|events|calendar|schedule)\b|\bmy\s+(?:meetings|calendar|schedule)\b",
        ),
        PatternRule::new(
            ListEmails,
            0.8,
            r"\b(?:list|show|see|check|read|any|what)\b.*\b(?:emails|inbox|mail|messages)\b|\bmy\s+(?:inbox|emails)\b",
        ),
        PatternRule::new(
            GetCourseDetails,
            0.75,
            r"\b(?:details|info|information)\b|\btell\s+me\s+about\b|\bdescribe\b|\babout\s+(?:the\s+)?(?:course|class)\b",
        ),
        PatternRule::new(
            ListCourses,
            0.85,
            r"\b(?:list|show|see|view|get|what|which|my|all)\b.*\b(?:courses|classes)\b",
        ),
        // ---- Creates ----
        PatternRule::new(InviteTeachers, 0.8, r"\b(?:invite|add)\b.*\b(?:co-?teachers?|teachers?)\b"),
        PatternRule::new(InviteStudents, 0.85, r"\binvite\b|\benroll\b|\badd\b.*@"),
        PatternRule::new(
            CreateAnnouncement,
            0.8,
            r"\bannounce\b|\b(?:post|create|make|add|send|new)\b.*\bannouncement\b",
        ),
        PatternRule::new(
            CreateAssignment,
            0.8,
            r"\b(?:create|add|make|new|assign|post|set\s+up)\b.*\b(?:assignment|homework|quiz)\b",
        ),
        PatternRule::new(
            CreateMeeting,
            0.8,
            r"\b(?:schedule|create|set\s+up|book|arrange|add|new|plan)\b.*\b(?:meeting|event|appointment|call|office\s+hours)\b",
        ),
        PatternRule::new(CreateCourse, 0.8, r"\b(?:create|add|make|new|start|set\s+up)\b.*\b(?:course|class)\b"),
        PatternRule::new(
            SendEmail,
            0.8,
            r"\bsend\b.*\b(?:email|e-mail|mail|message|note)\b|\b(?:email|e-mail|mail|message|write\s+to)\b.*(?:@|\bsaying\b)",
        ),
        // ---- Meta ----
        PatternRule::new(
            CapabilityQuestion,
            0.8,
            r"\bwhat\s+(?:can|do)\s+you\s+do\b|\bcan\s+you\b|\bare\s+you\s+able\b|\bcapabilit",
        ),
    ]
});

static CANCEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i){}", CANCEL)).expect("Invalid cancel regex"));

/// Whether the whole message asks to abandon the current request.
pub fn is_cancel(message: &str) -> bool {
    CANCEL_RE.is_match(message)
}

/// The rule list, in evaluation order.
pub fn rules() -> &'static [PatternRule] {
    &RULES
}

/// First rule matching `message`, without extracting parameters.
pub fn match_rule(message: &str) -> Option<&'static PatternRule> {
    let lowered = message.to_lowercase();
    RULES.iter().find(|r| r.matches(&lowered))
}

/// Offline classifier; never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, message: &str) -> IntentResult {
        self.classify_on(message, Local::now().date_naive())
    }

    /// Classify with relative dates resolved against `today`.
    pub fn classify_on(&self, message: &str, today: NaiveDate) -> IntentResult {
        match match_rule(message) {
            Some(rule) => IntentResult::new(
                rule.intent,
                rule.confidence,
                extract_for(rule.intent, message, today),
                IntentSource::Pattern,
            ),
            None => IntentResult::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_of(message: &str) -> Intent {
        PatternClassifier::new().classify(message).intent
    }

    // ---- Ordering ----

    #[test]
    fn test_list_meetings_never_create() {
        assert_eq!(intent_of("show my meetings"), Intent::ListMeetings);
        assert_eq!(intent_of("what meetings do I have tomorrow"), Intent::ListMeetings);
        assert_eq!(
            intent_of("schedule a meeting called Office Hours tomorrow at 3pm"),
            Intent::CreateMeeting
        );
    }

    #[test]
    fn test_destructive_before_list() {
        assert_eq!(intent_of("delete the announcement about grades"), Intent::DeleteAnnouncement);
        assert_eq!(intent_of("cancel the meeting Office Hours"), Intent::DeleteMeeting);
        assert_eq!(intent_of("remove a@x.com from Math 101"), Intent::RemoveStudent);
        assert_eq!(intent_of("delete the course Chemistry"), Intent::DeleteCourse);
    }

    #[test]
    fn test_update_before_create() {
        assert_eq!(
            intent_of("move the due date of Essay 1 in English to monday"),
            Intent::UpdateAssignment
        );
        assert_eq!(intent_of("reschedule Office Hours to friday"), Intent::UpdateMeeting);
        assert_eq!(intent_of("rename Biology 101 to Biology 102"), Intent::UpdateCourse);
    }

    #[test]
    fn test_create_rules() {
        assert_eq!(intent_of("create an assignment in English"), Intent::CreateAssignment);
        assert_eq!(intent_of("create a course named Biology 101"), Intent::CreateCourse);
        assert_eq!(intent_of("announce to Math 101 that class is cancelled"), Intent::CreateAnnouncement);
        assert_eq!(intent_of("invite a@x.com to teaching 1"), Intent::InviteStudents);
        assert_eq!(intent_of("invite teacher t@x.com to Math 101"), Intent::InviteTeachers);
        assert_eq!(intent_of("email a@x.com saying the test moved"), Intent::SendEmail);
    }

    #[test]
    fn test_list_rules() {
        assert_eq!(intent_of("list my courses"), Intent::ListCourses);
        assert_eq!(intent_of("show assignments in Math 101"), Intent::ListAssignments);
        assert_eq!(intent_of("show the roster for History"), Intent::ShowRoster);
        assert_eq!(intent_of("who teaches Math 101"), Intent::ListTeachers);
        assert_eq!(intent_of("show pending invitations for Math 101"), Intent::ListInvitations);
        assert_eq!(intent_of("show grades for Essay 1 in English"), Intent::ShowGrades);
        assert_eq!(intent_of("show submissions for Essay 1 in English"), Intent::ListSubmissions);
        assert_eq!(intent_of("give a@x.com 90 on Essay 1 in English"), Intent::GradeSubmission);
        assert_eq!(intent_of("check my inbox"), Intent::ListEmails);
        assert_eq!(intent_of("tell me about Math 101"), Intent::GetCourseDetails);
    }

    // ---- Conversational ----

    #[test]
    fn test_conversational_rules_are_anchored() {
        assert_eq!(intent_of("Hi!"), Intent::Greeting);
        assert_eq!(intent_of("thank you"), Intent::Thanks);
        assert_eq!(intent_of("help"), Intent::Help);
        assert_eq!(intent_of("what can you do?"), Intent::CapabilityQuestion);
        assert_eq!(intent_of("hi, list my courses"), Intent::ListCourses);
        assert_eq!(intent_of("can you list my courses"), Intent::ListCourses);
    }

    #[test]
    fn test_is_cancel() {
        assert!(is_cancel("cancel"));
        assert!(is_cancel("Never mind."));
        assert!(is_cancel("forget it"));
        assert!(!is_cancel("cancel the meeting Office Hours"));
        assert_eq!(intent_of("stop"), Intent::Cancel);
    }

    #[test]
    fn test_cancel_with_lead_in_and_please() {
        assert!(is_cancel("no, cancel that"));
        assert!(is_cancel("cancel please"));
        assert!(is_cancel("Okay, never mind please."));
        assert!(is_cancel("oh just forget about it"));
        assert_eq!(intent_of("no, cancel that"), Intent::Cancel);
        assert!(!is_cancel("no wait, the other one"));
        assert!(!is_cancel("no, cancel the meeting tomorrow"));
        assert_eq!(intent_of("please cancel my meeting on Friday"), Intent::DeleteMeeting);
    }

    #[test]
    fn test_no_match_is_unknown() {
        let result = PatternClassifier::new().classify("Essay 1");
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.5);
        assert!(result.parameters.is_empty());
    }

    #[test]
    fn test_classify_extracts_parameters() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let result = PatternClassifier::new().classify_on("list my courses", today);
        assert_eq!(result.intent, Intent::ListCourses);
        assert!(result.confidence >= 0.7);
        assert_eq!(result.source, IntentSource::Pattern);

        let result =
            PatternClassifier::new().classify_on("invite a@x.com and b@x.com to Math 101", today);
        assert_eq!(result.parameters["studentEmails"][1], "b@x.com");
        assert_eq!(result.parameters["courseName"], "Math 101");
    }

    #[test]
    fn test_every_rule_intent_is_distinct() {
        let mut seen = std::collections::HashSet::new();
        for rule in rules() {
            assert!(seen.insert(rule.intent), "{} has two rules", rule.intent);
        }
        // Unknown is the no-match result, never a rule.
        assert!(!seen.contains(&Intent::Unknown));
    }
}
