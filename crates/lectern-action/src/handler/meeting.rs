//! Calendar meetings.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use lectern_core::intent::Intent;
use lectern_core::taxonomy::keys;
use serde_json::{json, Map, Value};

use super::{plural, resolve_entity, ActionCall, ActionHandler, BackendResultExt, Lookup, Step};
use crate::types::{Entity, EntityKind, FailureKind, OrchestratorResponse};

const DEFAULT_DURATION_MINUTES: i64 = 60;
const TIME_ZONE: &str = "UTC";
const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct MeetingHandler;

#[async_trait]
impl ActionHandler for MeetingHandler {
    fn intents(&self) -> &'static [Intent] {
        &[
            Intent::ListMeetings,
            Intent::CreateMeeting,
            Intent::UpdateMeeting,
            Intent::DeleteMeeting,
        ]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let step = match call.intent {
            Intent::ListMeetings => list_meetings(call).await,
            Intent::CreateMeeting => create_meeting(call).await,
            Intent::UpdateMeeting => update_meeting(call).await,
            _ => delete_meeting(call).await,
        };
        step.unwrap_or_else(|response| response)
    }
}

// =============================================================================
// Date and time helpers
// =============================================================================

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

/// Accepts "15:00", "3:30pm", "3pm" and "3 pm".
fn parse_time(text: &str) -> Option<NaiveTime> {
    let compact = text.trim().to_lowercase().replace(' ', "");
    if let Ok(t) = NaiveTime::parse_from_str(&compact, "%H:%M") {
        return Some(t);
    }
    if let Ok(t) = NaiveTime::parse_from_str(&compact, "%I:%M%p") {
        return Some(t);
    }
    let (digits, pm) = if let Some(h) = compact.strip_suffix("pm") {
        (h, true)
    } else if let Some(h) = compact.strip_suffix("am") {
        (h, false)
    } else {
        return None;
    };
    let hour: u32 = digits.parse().ok().filter(|h| (1..=12).contains(h))?;
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, 0, 0)
}

fn invalid(what: &str, text: &str) -> OrchestratorResponse {
    OrchestratorResponse::failed(
        FailureKind::InvalidInput,
        format!("I couldn't understand the {} \"{}\".", what, text),
    )
}

fn date_param(call: &ActionCall<'_>, key: &str) -> Step<Option<NaiveDate>> {
    match call.str_param(key) {
        Some(text) => parse_date(text).map(Some).ok_or_else(|| invalid("date", text)),
        None => Ok(None),
    }
}

fn time_param(call: &ActionCall<'_>, key: &str) -> Step<Option<NaiveTime>> {
    match call.str_param(key) {
        Some(text) => parse_time(text).map(Some).ok_or_else(|| invalid("time", text)),
        None => Ok(None),
    }
}

fn parse_wire(text: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_local())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, WIRE_FORMAT).ok())
}

fn event_time(entity: &Entity, field: &str) -> Option<NaiveDateTime> {
    entity
        .raw
        .get(field)?
        .get("dateTime")
        .and_then(Value::as_str)
        .and_then(parse_wire)
}

fn wire_time(at: NaiveDateTime) -> Value {
    json!({"dateTime": at.format(WIRE_FORMAT).to_string(), "timeZone": TIME_ZONE})
}

fn when_label(at: NaiveDateTime) -> String {
    format!("{} at {}", at.format("%Y-%m-%d"), at.format("%H:%M"))
}

fn meeting_line(meeting: &Entity) -> String {
    match event_time(meeting, "start") {
        Some(start) => format!("- {} ({})", meeting.display_name, start.format("%Y-%m-%d %H:%M")),
        None => format!("- {}", meeting.display_name),
    }
}

// =============================================================================
// Operations
// =============================================================================

async fn list_meetings(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let on_day = date_param(call, keys::DATE)?;
    let meetings = call
        .backend
        .list(call.token, &EntityKind::Meeting)
        .await
        .or_fail(call.intent)?;
    let meetings: Vec<&Entity> = meetings
        .iter()
        .filter(|m| match on_day {
            Some(day) => event_time(m, "start").is_some_and(|s| s.date() == day),
            None => true,
        })
        .collect();

    if meetings.is_empty() {
        let message = match on_day {
            Some(day) => format!("You have no meetings on {}.", day.format("%Y-%m-%d")),
            None => "You have no upcoming meetings.".to_string(),
        };
        return Ok(OrchestratorResponse::completed_with(message, json!({"count": 0})));
    }

    let lines: Vec<String> = meetings.iter().map(|m| meeting_line(m)).collect();
    Ok(OrchestratorResponse::completed_with(
        format!("You have {}:\n{}", plural(meetings.len(), "meeting"), lines.join("\n")),
        json!({"count": meetings.len()}),
    ))
}

async fn create_meeting(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let Some(title) = call.str_param(keys::TITLE) else {
        return Err(call.ask_for(keys::TITLE));
    };
    let Some(date) = date_param(call, keys::DATE)? else {
        return Err(call.ask_for(keys::DATE));
    };
    let Some(time) = time_param(call, keys::TIME)? else {
        return Err(call.ask_for(keys::TIME));
    };
    let minutes = call
        .number_param(keys::DURATION_MINUTES)
        .map(|m| m.round() as i64)
        .filter(|m| *m > 0)
        .unwrap_or(DEFAULT_DURATION_MINUTES);

    let start = date.and_time(time);
    let end = start + Duration::minutes(minutes);
    let attendees: Vec<Value> = call
        .list_param(keys::ATTENDEES)
        .into_iter()
        .map(|email| json!({"email": email}))
        .collect();

    let mut body = Map::new();
    body.insert("summary".into(), json!(title));
    body.insert("start".into(), wire_time(start));
    body.insert("end".into(), wire_time(end));
    if !attendees.is_empty() {
        body.insert("attendees".into(), Value::Array(attendees));
    }
    if let Some(description) = call.str_param(keys::DESCRIPTION) {
        body.insert("description".into(), json!(description));
    }

    let created = call
        .backend
        .create(call.token, &EntityKind::Meeting, Value::Object(body))
        .await
        .or_fail(call.intent)?;

    Ok(OrchestratorResponse::completed_with(
        format!(
            "Scheduled \"{}\" on {} for {} minutes.",
            created.display_name,
            when_label(start),
            minutes
        ),
        json!({"id": created.id}),
    ))
}

fn meeting_lookup() -> Lookup<'static> {
    Lookup {
        kind: EntityKind::Meeting,
        name_key: keys::TITLE,
        id_key: keys::MEETING_ID,
        noun: "meeting",
    }
}

async fn update_meeting(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let new_date = date_param(call, keys::NEW_DATE)?;
    let new_time = time_param(call, keys::NEW_TIME)?;
    let new_name = call.str_param(keys::NEW_NAME);
    if new_date.is_none() && new_time.is_none() && new_name.is_none() {
        return Err(call.ask_for(keys::NEW_DATE));
    }

    let meeting = resolve_entity(call, meeting_lookup()).await?;

    let mut changes = Map::new();
    if let Some(name) = new_name {
        changes.insert("summary".into(), json!(name));
    }
    let mut moved_to = None;
    if new_date.is_some() || new_time.is_some() {
        let Some(old_start) = event_time(&meeting, "start") else {
            return Err(OrchestratorResponse::failed(
                FailureKind::Rejected,
                format!("\"{}\" has no fixed start time to move.", meeting.display_name),
            ));
        };
        let duration = event_time(&meeting, "end")
            .map(|end| end - old_start)
            .unwrap_or_else(|| Duration::minutes(DEFAULT_DURATION_MINUTES));
        let start = new_date
            .unwrap_or(old_start.date())
            .and_time(new_time.unwrap_or(old_start.time()));
        changes.insert("start".into(), wire_time(start));
        changes.insert("end".into(), wire_time(start + duration));
        moved_to = Some(start);
    }

    let updated = call
        .backend
        .patch(call.token, &EntityKind::Meeting, &meeting.id, Value::Object(changes))
        .await
        .or_fail(call.intent)?;

    let message = match moved_to {
        Some(start) => format!("Moved \"{}\" to {}.", updated.display_name, when_label(start)),
        None => format!("Renamed \"{}\" to \"{}\".", meeting.display_name, updated.display_name),
    };
    Ok(OrchestratorResponse::completed(message))
}

async fn delete_meeting(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let meeting = resolve_entity(call, meeting_lookup()).await?;
    call.backend
        .delete(call.token, &EntityKind::Meeting, &meeting.id)
        .await
        .or_fail(call.intent)?;
    Ok(OrchestratorResponse::completed(format!(
        "Cancelled the meeting \"{}\".",
        meeting.display_name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOp;
    use crate::handler::test_support::*;

    fn seed_meeting(fx: &Fixture, title: &str, start: &str, end: &str) -> Entity {
        fx.backend.seed(
            &EntityKind::Meeting,
            json!({
                "summary": title,
                "start": {"dateTime": start, "timeZone": "UTC"},
                "end": {"dateTime": end, "timeZone": "UTC"}
            }),
        )
    }

    // ---- Parsing ----

    #[test]
    fn test_parse_time_variants() {
        let three_pm = NaiveTime::from_hms_opt(15, 0, 0);
        assert_eq!(parse_time("15:00"), three_pm);
        assert_eq!(parse_time("3pm"), three_pm);
        assert_eq!(parse_time("3 PM"), three_pm);
        assert_eq!(parse_time("3:30pm"), NaiveTime::from_hms_opt(15, 30, 0));
        assert_eq!(parse_time("12am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_time("noonish"), None);
        assert_eq!(parse_time("13pm"), None);
    }

    #[test]
    fn test_parse_wire_with_offset() {
        let at = parse_wire("2026-10-20T15:00:00+02:00").unwrap();
        assert_eq!(at.format("%H:%M").to_string(), "15:00");
        assert!(parse_wire("2026-10-20T15:00:00").is_some());
    }

    // ---- Operations ----

    #[tokio::test]
    async fn test_create_meeting_body() {
        let fx = Fixture::new();
        let p = params(json!({
            "title": "Office Hours",
            "date": "2026-10-20",
            "time": "3pm",
            "attendees": ["a@x.com"]
        }));
        let r = MeetingHandler.execute(&fx.call(Intent::CreateMeeting, &p, "")).await;
        assert_eq!(
            r.message(),
            "Scheduled \"Office Hours\" on 2026-10-20 at 15:00 for 60 minutes."
        );
        let stored = fx.backend.entities(&EntityKind::Meeting);
        assert_eq!(stored[0].raw["end"]["dateTime"], "2026-10-20T16:00:00");
        assert_eq!(stored[0].raw["attendees"][0]["email"], "a@x.com");
    }

    #[tokio::test]
    async fn test_create_meeting_bad_date() {
        let fx = Fixture::new();
        let p = params(json!({"title": "Sync", "date": "the other day", "time": "10:00"}));
        let r = MeetingHandler.execute(&fx.call(Intent::CreateMeeting, &p, "")).await;
        assert_eq!(r.failure_kind(), Some(FailureKind::InvalidInput));
        assert_eq!(fx.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_list_meetings_filters_by_date() {
        let fx = Fixture::new();
        seed_meeting(&fx, "Standup", "2026-10-20T09:00:00", "2026-10-20T09:15:00");
        seed_meeting(&fx, "Review", "2026-10-21T14:00:00", "2026-10-21T15:00:00");

        let p = params(json!({}));
        let r = MeetingHandler.execute(&fx.call(Intent::ListMeetings, &p, "")).await;
        assert!(r.message().starts_with("You have 2 meetings"));

        let p = params(json!({"date": "2026-10-21"}));
        let r = MeetingHandler.execute(&fx.call(Intent::ListMeetings, &p, "")).await;
        assert_eq!(r.message(), "You have 1 meeting:\n- Review (2026-10-21 14:00)");

        let p = params(json!({"date": "2026-12-25"}));
        let r = MeetingHandler.execute(&fx.call(Intent::ListMeetings, &p, "")).await;
        assert_eq!(r.message(), "You have no meetings on 2026-12-25.");
    }

    #[tokio::test]
    async fn test_move_meeting_keeps_duration() {
        let fx = Fixture::new();
        seed_meeting(&fx, "Standup", "2026-10-20T09:00:00", "2026-10-20T09:15:00");
        let p = params(json!({"title": "standup", "newTime": "10:30"}));
        let r = MeetingHandler.execute(&fx.call(Intent::UpdateMeeting, &p, "")).await;
        assert_eq!(r.message(), "Moved \"Standup\" to 2026-10-20 at 10:30.");
        let stored = fx.backend.entities(&EntityKind::Meeting);
        assert_eq!(stored[0].raw["end"]["dateTime"], "2026-10-20T10:45:00");
    }

    #[tokio::test]
    async fn test_update_meeting_without_changes_asks() {
        let fx = Fixture::new();
        let p = params(json!({"title": "standup"}));
        let r = MeetingHandler.execute(&fx.call(Intent::UpdateMeeting, &p, "")).await;
        match r {
            OrchestratorResponse::NeedsParameter { missing_parameters, .. } => {
                assert_eq!(missing_parameters, vec!["newDate".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fx.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_meeting() {
        let fx = Fixture::new();
        seed_meeting(&fx, "Standup", "2026-10-20T09:00:00", "2026-10-20T09:15:00");
        let p = params(json!({"title": "STANDUP"}));
        let r = MeetingHandler.execute(&fx.call(Intent::DeleteMeeting, &p, "")).await;
        assert_eq!(r.message(), "Cancelled the meeting \"Standup\".");
        assert_eq!(fx.backend.calls(BackendOp::Delete), 1);
        assert!(fx.backend.entities(&EntityKind::Meeting).is_empty());
    }
}
