//! Continuation detection.
//!
//! While an action is collecting parameters, a reply that has the shape of a
//! missing slot fills it. Name and free-text slots are only filled for the
//! first missing parameter, and never from a message that reads as a new
//! command.

use chrono::NaiveDate;
use lectern_core::context::OngoingAction;
use lectern_core::intent::{Intent, IntentResult, IntentSource};
use lectern_core::taxonomy::{keys, spec_for, ParamShape};
use lectern_core::types::Parameters;
use serde_json::{json, Value};
use tracing::debug;

use super::extract::{bare_number, clean_name, emails, grade, resolve_date, time_phrase};
use super::patterns::match_rule;
use super::ClassifierInput;

pub const CONTINUATION_CONFIDENCE: f32 = 0.95;

/// Longest reply still read as a bare name.
const MAX_NAME_WORDS: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuationDetector;

impl ContinuationDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, input: &ClassifierInput<'_>, today: NaiveDate) -> Option<IntentResult> {
        let ongoing = input.context.ongoing_action.as_ref()?;
        let message = input.message.trim();
        if message.is_empty() {
            return None;
        }
        // Any rule match, conversational ones included, means this is not a slot value.
        let command = match_rule(message).map(|rule| rule.intent);

        let mut filled = Parameters::new();
        for (index, name) in ongoing.missing_parameters.iter().enumerate() {
            let value = match shape_of(ongoing.action, name) {
                ParamShape::EmailList => email_value(name, message),
                ParamShape::Date => {
                    resolve_date(message, today).map(|d| json!(d.format("%Y-%m-%d").to_string()))
                }
                ParamShape::Time => time_phrase(message).map(Value::String),
                ParamShape::Number => bare_number(message).or_else(|| grade(message)).map(|n| json!(n)),
                ParamShape::Name if index == 0 && command.is_none() => name_value(message),
                ParamShape::FreeText if index == 0 && command.is_none() => {
                    Some(Value::String(message.to_string()))
                }
                _ => None,
            };
            if let Some(value) = value {
                filled.insert(name.clone(), value);
            }
        }

        if filled.is_empty() {
            debug!(action = %ongoing.action, "Reply did not fill a missing parameter");
            return None;
        }
        Some(continue_with(ongoing, &filled))
    }
}

fn continue_with(ongoing: &OngoingAction, filled: &Parameters) -> IntentResult {
    let mut merged = ongoing.clone();
    merged.merge(filled);
    debug!(
        action = %ongoing.action,
        filled = ?filled.keys().collect::<Vec<_>>(),
        still_missing = ?merged.missing_parameters,
        "Parameters collected"
    );
    let mut result = IntentResult::new(
        ongoing.action,
        CONTINUATION_CONFIDENCE,
        merged.collected_parameters,
        IntentSource::Continuation,
    );
    result.is_parameter_collection = true;
    result
}

/// Shape of a slot, from the table or, for slots a handler asked for, from
/// its key.
fn shape_of(intent: Intent, name: &str) -> ParamShape {
    if let Some(spec) = spec_for(intent).param(name) {
        return spec.shape;
    }
    match name {
        keys::DATE | keys::NEW_DATE | keys::DUE_DATE => ParamShape::Date,
        keys::TIME | keys::NEW_TIME | keys::DUE_TIME => ParamShape::Time,
        keys::GRADE | keys::MAX_POINTS | keys::DURATION_MINUTES => ParamShape::Number,
        keys::TEXT | keys::BODY | keys::DESCRIPTION => ParamShape::FreeText,
        n if n.ends_with("Emails") || n == keys::RECIPIENTS || n == keys::ATTENDEES => {
            ParamShape::EmailList
        }
        keys::STUDENT_EMAIL => ParamShape::EmailList,
        _ => ParamShape::Name,
    }
}

fn email_value(name: &str, message: &str) -> Option<Value> {
    let found = emails(message);
    if found.is_empty() {
        return None;
    }
    if name.ends_with("Emails") || name == keys::RECIPIENTS || name == keys::ATTENDEES {
        Some(json!(found))
    } else {
        Some(json!(found[0]))
    }
}

/// A short reply with no command structure, minus any lead-in like "in" or
/// "the course".
fn name_value(message: &str) -> Option<Value> {
    if message.split_whitespace().count() > MAX_NAME_WORDS || message.contains('@') {
        return None;
    }
    let mut name = message.trim_end_matches(['.', '!', '?']).trim().to_string();
    loop {
        let lower = name.to_ascii_lowercase();
        let lead = ["it's ", "its ", "it is ", "in ", "for ", "to ", "the ", "my ", "course ", "class ", "called ", "named "]
            .iter()
            .find(|p| lower.starts_with(*p));
        match lead {
            Some(p) => name = name[p.len()..].trim().to_string(),
            None => break,
        }
    }
    let name = clean_name(&name);
    (!name.is_empty()).then_some(Value::String(name))
}
