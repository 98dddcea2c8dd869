//! Targeted parameter extraction from raw messages.
//!
//! Each extractor looks for one kind of value (emails, a course reference,
//! a "named X" phrase, a date, a time, a number) and returns `None` when the
//! message does not carry it. [`extract_for`] runs the extractors an intent's
//! table entry asks for.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use lectern_core::intent::Intent;
use lectern_core::taxonomy::{keys, spec_for};
use lectern_core::types::Parameters;
use regex::Regex;
use serde_json::{json, Value};

// =============================================================================
// Compiled patterns
// =============================================================================

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("Invalid email regex")
});

struct CoursePatterns {
    /// "the class is X"
    stated: Regex,
    /// "course named X"
    named: Regex,
    /// Preposition introducing a reference; the text after it is the candidate.
    preposition: Regex,
    /// "delete the course X", "archive Physics 2"
    verb_object: Regex,
}

static COURSE_PATTERNS: LazyLock<CoursePatterns> = LazyLock::new(|| CoursePatterns {
    stated: Regex::new(r"(?i)\bthe\s+(?:class|course)\s+(?:is|was|should\s+be)\s+(.+)$").unwrap(),
    named: Regex::new(r"(?i)\b(?:class|course)\s+(?:named|called|titled)\s+(.+)$").unwrap(),
    preposition: Regex::new(r"(?i)\b(?:to|in|for|from|about|of)\s+").unwrap(),
    verb_object: Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:delete|archive|remove|rename|edit|update)\s+(?:the\s+|my\s+)?(?:(?:course|class)\s+)?(.+)$",
    )
    .unwrap(),
});

/// Text after which the command's payload starts.
static PAYLOAD_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+(?:saying|that\s+says|says|stating|telling\s+them)\s+|\s+that\s+|:\s|""#).unwrap()
});

static NAMED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:named|called|titled)\s+(.+)$").unwrap());

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“]([^"”]+)["”]"#).unwrap());

static MEETING_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:meeting|event|appointment)\s+(?:called\s+|named\s+|titled\s+)?(.+)$").unwrap()
});

static ASSIGNMENT_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:assignment|homework|of|for|on|rename)\s+(.+?)\s+(?:in|from|for)\s+").unwrap()
});

static RENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:rename|change\s+the\s+(?:name|title)\s+of)\b").unwrap()
});

static LAST_TO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(.*)\s+to\s+(.+)$").unwrap());

static ABOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\babout\s+(?:the\s+)?(.+?)(?:\s+(?:in|from|for)\s+|$)").unwrap()
});

static PAYLOAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:saying|that\s+says|says|stating|telling\s+them|that)\s+|:\s+)(.+)$").unwrap()
});

static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsubject\s*(?:line\s*)?(?:is|:)?\s*(?:"([^"]+)"|(.+?)\s+(?:saying|and\s+say|that\s+says)\b)"#)
        .unwrap()
});

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsection\s+([A-Za-z0-9-]+)").unwrap());

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bdescription\s*(?:is|:)?\s*(?:"([^"]+)"|(.+)$)"#).unwrap()
});

struct NumberPatterns {
    grade_verb: Regex,
    grade_on: Regex,
    points: Regex,
    minutes: Regex,
    hours: Regex,
    bare: Regex,
}

static NUMBER_PATTERNS: LazyLock<NumberPatterns> = LazyLock::new(|| NumberPatterns {
    grade_verb: Regex::new(r"(?i)\b(?:grade|score|mark)\s+(?:of\s+|to\s+|as\s+)?(\d+(?:\.\d+)?)\b").unwrap(),
    grade_on: Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s*(?:/\s*\d+\s*)?(?:points?\s+|pts\s+)?(?:on|for)\b",
    )
    .unwrap(),
    points: Regex::new(r"(?i)\b(?:worth|out\s+of)\s+(\d+)|\b(\d+)\s*(?:points?|pts)\b").unwrap(),
    minutes: Regex::new(r"(?i)\b(\d+)\s*(?:minutes?|mins?)\b").unwrap(),
    hours: Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(?:hours?|hrs?)\b").unwrap(),
    bare: Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:points?|pts|%)?\s*[.!]?\s*$").unwrap(),
});

struct DatePatterns {
    iso: Regex,
    day_after_tomorrow: Regex,
    tomorrow: Regex,
    today: Regex,
    in_days: Regex,
    next_week: Regex,
    weekday: Regex,
    month_day: Regex,
    slash: Regex,
}

static DATE_PATTERNS: LazyLock<DatePatterns> = LazyLock::new(|| DatePatterns {
    iso: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap(),
    day_after_tomorrow: Regex::new(r"(?i)\bday\s+after\s+tomorrow\b").unwrap(),
    tomorrow: Regex::new(r"(?i)\btomorrow\b").unwrap(),
    today: Regex::new(r"(?i)\b(?:today|tonight)\b").unwrap(),
    in_days: Regex::new(r"(?i)\bin\s+(\d+|a|one|two|three)\s+(days?|weeks?)\b").unwrap(),
    next_week: Regex::new(r"(?i)\bnext\s+week\b").unwrap(),
    weekday: Regex::new(
        r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)\b",
    )
    .unwrap(),
    month_day: Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b",
    )
    .unwrap(),
    slash: Regex::new(r"\b(\d{1,2})/(\d{1,2})\b").unwrap(),
});

struct TimePatterns {
    clock: Regex,
    meridiem: Regex,
    noon: Regex,
}

static TIME_PATTERNS: LazyLock<TimePatterns> = LazyLock::new(|| TimePatterns {
    clock: Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(am\b|pm\b|a\.m\.|p\.m\.)?").unwrap(),
    meridiem: Regex::new(r"(?i)\b(\d{1,2})\s*(am\b|pm\b|a\.m\.|p\.m\.)").unwrap(),
    noon: Regex::new(r"(?i)\b(noon|midday|midnight)\b").unwrap(),
});

/// Where a name candidate ends.
const NAME_STOPS: &[&str] = &[
    " due ", " saying ", " that ", " with ", " and ", " at ", " on ", " by ", " to ", " in ",
    " for ", " from ", " tomorrow", " today", " tonight", " next ", " this ", " please",
];

const NOT_A_NAME: &[&str] = &[
    "it", "them", "that", "this", "him", "her", "me", "us", "you", "everyone", "all", "class",
    "course", "classes", "courses", "students", "my students", "the students", "there", "here",
];

/// A reference starting with one of these names a different kind of thing.
const OTHER_NOUNS: &[&str] = &[
    "assignment", "announcement", "meeting", "student", "students", "teacher", "teachers",
    "email", "invitation", "invitations", "grades", "roster", "homework",
];

// =============================================================================
// Value extractors
// =============================================================================

/// Email addresses in order of appearance, lowercased and de-duplicated.
pub fn emails(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in EMAIL_RE.find_iter(text) {
        let email = m.as_str().trim_end_matches('.').to_lowercase();
        if !found.contains(&email) {
            found.push(email);
        }
    }
    found
}

/// Course reference in `text`.
///
/// Tried in order: "the class is X", "course named X", the last preposition
/// phrase that yields a plausible name, then a leading verb's object.
pub fn course_name(text: &str) -> Option<String> {
    let p = &*COURSE_PATTERNS;
    if let Some(c) = p.stated.captures(text) {
        if let Some(name) = plausible_course(&c[1]) {
            return Some(name);
        }
    }
    if let Some(c) = p.named.captures(text) {
        if let Some(name) = plausible_course(&c[1]) {
            return Some(name);
        }
    }

    let head = command_head(text);
    let starts: Vec<usize> = p.preposition.find_iter(head).map(|m| m.end()).collect();
    for start in starts.into_iter().rev() {
        if let Some(name) = plausible_course(&head[start..]) {
            return Some(name);
        }
    }

    p.verb_object
        .captures(head)
        .and_then(|c| plausible_course(&c[1]))
}

/// Value introduced by "named", "called" or "titled", or the first quoted
/// string.
pub fn named_value(text: &str) -> Option<String> {
    if let Some(c) = QUOTED_RE.captures(text) {
        let value = c[1].trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    NAMED_RE
        .captures(text)
        .map(|c| clean_name(&c[1]))
        .filter(|v| !v.is_empty() && !is_date_word(v))
}

fn meeting_title(text: &str) -> Option<String> {
    named_value(text).or_else(|| {
        MEETING_TITLE_RE
            .captures(text)
            .map(|c| strip_leading_article(&clean_name(&c[1])))
            .filter(|v| !v.is_empty() && !is_date_word(v) && !NOT_A_NAME.contains(&v.to_lowercase().as_str()))
    })
}

/// Assignment reference: a named or quoted value, else the phrase between
/// "assignment"/"of"/"for"/"on" and the course preposition.
pub fn assignment_title(text: &str) -> Option<String> {
    if let Some(v) = named_value(text) {
        return Some(v);
    }
    ASSIGNMENT_TITLE_RE
        .captures_iter(text)
        .map(|c| strip_leading_article(c[1].trim()))
        .find(|v| !v.is_empty() && !v.contains('@') && v.parse::<f64>().is_err())
}

/// Announcement or email payload: quoted text, or what follows "saying",
/// "that" or a colon.
pub fn payload(text: &str) -> Option<String> {
    if let Some(c) = QUOTED_RE.captures(text) {
        let value = c[1].trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    PAYLOAD_RE
        .captures(text)
        .map(|c| c[1].trim().trim_end_matches(['.', '!']).trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Topic of "the announcement about X in Course".
fn about_topic(text: &str) -> Option<String> {
    if let Some(c) = QUOTED_RE.captures(text) {
        return Some(c[1].trim().to_string());
    }
    ABOUT_RE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn subject(text: &str) -> Option<String> {
    let c = SUBJECT_RE.captures(text)?;
    c.get(1)
        .or_else(|| c.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Grade in "give a@x.com 90 on Essay 1" or "grade of 87.5".
pub fn grade(text: &str) -> Option<f64> {
    let without_emails = EMAIL_RE.replace_all(text, " ");
    let p = &*NUMBER_PATTERNS;
    p.grade_verb
        .captures(&without_emails)
        .or_else(|| p.grade_on.captures(&without_emails))
        .or_else(|| p.bare.captures(&without_emails))
        .and_then(|c| c[1].parse().ok())
}

pub fn max_points(text: &str) -> Option<f64> {
    let c = NUMBER_PATTERNS.points.captures(text)?;
    c.get(1).or_else(|| c.get(2))?.as_str().parse().ok()
}

/// Meeting length in minutes.
pub fn duration_minutes(text: &str) -> Option<u32> {
    let p = &*NUMBER_PATTERNS;
    if let Some(c) = p.minutes.captures(text) {
        return c[1].parse().ok();
    }
    if let Some(c) = p.hours.captures(text) {
        let hours: f64 = c[1].parse().ok()?;
        return Some((hours * 60.0).round() as u32);
    }
    let lower = text.to_lowercase();
    if lower.contains("half an hour") || lower.contains("half hour") {
        Some(30)
    } else if lower.contains("an hour") || lower.contains("one hour") {
        Some(60)
    } else {
        None
    }
}

/// A lone number, as in a reply to "what grade should I give?".
pub fn bare_number(text: &str) -> Option<f64> {
    NUMBER_PATTERNS
        .bare
        .captures(text)
        .and_then(|c| c[1].parse().ok())
}

/// Resolve a date phrase relative to `today`.
///
/// Weekday names mean the next such day, one to seven days ahead. Month/day
/// forms without a year roll over to next year once passed.
pub fn resolve_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let p = &*DATE_PATTERNS;

    if let Some(c) = p.iso.captures(text) {
        let (y, m, d) = (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    if p.day_after_tomorrow.is_match(text) {
        return Some(today + Duration::days(2));
    }
    if p.tomorrow.is_match(text) {
        return Some(today + Duration::days(1));
    }
    if p.today.is_match(text) {
        return Some(today);
    }
    if let Some(c) = p.in_days.captures(text) {
        let n: i64 = match c[1].to_lowercase().as_str() {
            "a" | "one" => 1,
            "two" => 2,
            "three" => 3,
            digits => digits.parse().ok()?,
        };
        let days = if c[2].to_lowercase().starts_with("week") { n * 7 } else { n };
        return Some(today + Duration::days(days));
    }
    if p.next_week.is_match(text) {
        return Some(today + Duration::days(7));
    }
    if let Some(c) = p.weekday.captures(text) {
        let target = weekday_from(&c[1])?;
        let ahead = (target.num_days_from_monday() as i64 - today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        let ahead = if ahead == 0 { 7 } else { ahead };
        return Some(today + Duration::days(ahead));
    }
    if let Some(c) = p.month_day.captures(text) {
        let month = month_from(&c[1])?;
        let day = c[2].parse().ok()?;
        return upcoming(today, month, day);
    }
    if let Some(c) = p.slash.captures(text) {
        let month = c[1].parse().ok()?;
        let day = c[2].parse().ok()?;
        return upcoming(today, month, day);
    }
    None
}

/// Time of day as `HH:MM`.
pub fn time_phrase(text: &str) -> Option<String> {
    let p = &*TIME_PATTERNS;
    if let Some(c) = p.clock.captures(text) {
        let hour: u32 = c[1].parse().ok()?;
        let minute: u32 = c[2].parse().ok()?;
        let hour = match c.get(3) {
            Some(m) => to_24h(hour, m.as_str())?,
            None => hour,
        };
        return (hour < 24 && minute < 60).then(|| format!("{:02}:{:02}", hour, minute));
    }
    if let Some(c) = p.meridiem.captures(text) {
        let hour = to_24h(c[1].parse().ok()?, &c[2])?;
        return Some(format!("{:02}:00", hour));
    }
    p.noon.captures(text).map(|c| {
        if c[1].eq_ignore_ascii_case("midnight") {
            "00:00".to_string()
        } else {
            "12:00".to_string()
        }
    })
}

/// Split "rename X to Y" into the part naming the target and the new name.
pub fn split_rename(text: &str) -> Option<(String, String)> {
    if !RENAME_RE.is_match(text) {
        return None;
    }
    let c = LAST_TO_RE.captures(text)?;
    let new_name = clean_name(&c[2]);
    if new_name.is_empty() {
        return None;
    }
    Some((c[1].to_string(), new_name))
}

// =============================================================================
// Intent-driven extraction
// =============================================================================

/// Every parameter `intent` accepts that the message carries.
pub fn extract_for(intent: Intent, raw: &str, today: NaiveDate) -> Parameters {
    let spec = spec_for(intent);
    let rename = if spec.accepts(keys::NEW_NAME) {
        split_rename(raw)
    } else {
        None
    };
    let target = rename.as_ref().map(|(head, _)| head.as_str()).unwrap_or(raw);

    let mut params = Parameters::new();
    let names = spec
        .required
        .iter()
        .map(|p| p.name)
        .chain(spec.optional.iter().copied());

    for key in names {
        let value = match key {
            keys::COURSE_NAME if intent == Intent::CreateCourse => {
                course_name(raw).or_else(|| named_value(raw)).map(Value::String)
            }
            keys::COURSE_NAME => course_name(target).map(Value::String),
            keys::NEW_NAME => rename.as_ref().map(|(_, n)| Value::String(n.clone())),
            keys::SECTION => SECTION_RE.captures(raw).map(|c| json!(c[1].to_string())),
            keys::DESCRIPTION => DESCRIPTION_RE.captures(raw).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .map(|m| json!(m.as_str().trim()))
            }),
            keys::TITLE if intent == Intent::CreateAssignment => named_value(raw).map(Value::String),
            keys::TITLE => meeting_title(target).map(Value::String),
            keys::ASSIGNMENT_TITLE => assignment_title(target).map(Value::String),
            keys::DUE_DATE | keys::DATE | keys::NEW_DATE => {
                resolve_date(raw, today).map(|d| json!(d.format("%Y-%m-%d").to_string()))
            }
            keys::DUE_TIME | keys::TIME | keys::NEW_TIME => time_phrase(raw).map(Value::String),
            keys::MAX_POINTS => max_points(raw).map(|n| json!(n)),
            keys::TEXT if intent == Intent::DeleteAnnouncement => about_topic(raw).map(Value::String),
            keys::TEXT | keys::BODY => payload(raw).map(Value::String),
            keys::STUDENT_EMAILS | keys::TEACHER_EMAILS | keys::RECIPIENTS | keys::ATTENDEES => {
                let found = emails(raw);
                (!found.is_empty()).then(|| json!(found))
            }
            keys::STUDENT_EMAIL => emails(raw).into_iter().next().map(Value::String),
            keys::GRADE => grade(raw).map(|n| json!(n)),
            keys::DURATION_MINUTES => duration_minutes(raw).map(|n| json!(n)),
            keys::SUBJECT => subject(raw).map(Value::String),
            _ => None,
        };
        if let Some(value) = value {
            params.insert(key.to_string(), value);
        }
    }
    params
}

// =============================================================================
// Helpers
// =============================================================================

/// The part of a message before its payload ("saying ...", ": ...").
fn command_head(text: &str) -> &str {
    match PAYLOAD_START_RE.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

/// Cut a candidate at the first stop phrase or punctuation.
pub fn clean_name(candidate: &str) -> String {
    let padded = format!(" {} ", candidate.trim());
    let lower = padded.to_ascii_lowercase();
    let mut end = padded.len();
    for stop in NAME_STOPS {
        // Skip the leading pad so a stop at position 0 is not matched.
        if let Some(i) = lower[1..].find(stop) {
            end = end.min(i + 1);
        }
    }
    if let Some(i) = padded.find([',', ';', '!', '?', '(']) {
        end = end.min(i);
    }
    if let Some(i) = padded.find(". ") {
        end = end.min(i);
    }
    padded[..end]
        .trim()
        .trim_end_matches('.')
        .trim_matches(['"', '\'', '“', '”'])
        .trim()
        .to_string()
}

fn strip_leading_article(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    for article in ["the ", "my ", "a ", "an "] {
        if lower.starts_with(article) {
            return value[article.len()..].trim().to_string();
        }
    }
    value.trim().to_string()
}

fn plausible_course(candidate: &str) -> Option<String> {
    let mut name = clean_name(candidate);
    loop {
        let lower = name.to_ascii_lowercase();
        let stripped = ["the ", "my ", "course ", "class "]
            .iter()
            .find(|p| lower.starts_with(*p))
            .map(|p| name[p.len()..].trim().to_string());
        match stripped {
            Some(s) => name = s,
            None => break,
        }
    }

    let lower = name.to_lowercase();
    let first_word = lower.split_whitespace().next().unwrap_or("");
    let rejected = name.is_empty()
        || name.len() > 60
        || name.contains('@')
        || is_date_word(&name)
        || NOT_A_NAME.contains(&lower.as_str())
        || OTHER_NOUNS.contains(&first_word)
        || matches!(first_word, "a" | "an");
    (!rejected).then_some(name)
}

fn is_date_word(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    let p = &*DATE_PATTERNS;
    matches!(lower.as_str(), "today" | "tomorrow" | "tonight" | "next week")
        || p.weekday.find(&lower).is_some_and(|m| m.as_str().len() == lower.len())
        || p.iso.find(&lower).is_some_and(|m| m.as_str().len() == lower.len())
        || (lower.starts_with("next ") && p.weekday.is_match(&lower))
}

fn weekday_from(name: &str) -> Option<Weekday> {
    let lower = name.to_lowercase();
    let day = match &lower[..lower.len().min(3)] {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

fn month_from(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_lowercase();
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

/// Next occurrence of month/day on or after `today`.
fn upcoming(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

fn to_24h(hour: u32, meridiem: &str) -> Option<u32> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.to_lowercase().starts_with('p');
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    })
}
