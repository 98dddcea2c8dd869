//! Correction detection.
//!
//! "Sorry, I meant b@x.com" re-runs the previous intent with the corrected
//! values written over the previous parameters. Only considered when the
//! message carries a correction marker, the conversation has a prior turn,
//! and a last intent is known.

use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use lectern_core::intent::{Intent, IntentResult, IntentSource};
use lectern_core::taxonomy::{keys, spec_for};
use lectern_core::types::Parameters;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::extract::{course_name, emails, extract_for};
use super::model::{accepted_parameters, json_object, ModelClassifier};
use super::ClassifierInput;
use crate::llm::LlmError;

pub const CORRECTION_CONFIDENCE: f32 = 0.95;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:actually|i\s+meant|sorry|instead|no\s+wait|i\s+mean|correction)\b")
        .expect("Invalid correction marker regex")
});

/// Names whose correction invalidates a previously chosen id.
const CHOSEN_IDS: &[(&str, &str)] = &[
    (keys::COURSE_NAME, keys::COURSE_ID),
    (keys::ASSIGNMENT_TITLE, keys::ASSIGNMENT_ID),
    (keys::TITLE, keys::MEETING_ID),
    (keys::TEXT, keys::ANNOUNCEMENT_ID),
];

const EMAIL_LIST_KEYS: &[&str] = &[
    keys::STUDENT_EMAILS,
    keys::TEACHER_EMAILS,
    keys::RECIPIENTS,
    keys::ATTENDEES,
];

pub fn has_marker(message: &str) -> bool {
    MARKER_RE.is_match(message)
}

pub struct CorrectionDetector {
    model: Option<Arc<ModelClassifier>>,
}

impl CorrectionDetector {
    pub fn new(model: Option<Arc<ModelClassifier>>) -> Self {
        Self { model }
    }

    pub async fn detect(&self, input: &ClassifierInput<'_>, today: NaiveDate) -> Option<IntentResult> {
        if !has_marker(input.message) || input.history.is_empty() {
            return None;
        }
        let last = input.context.last_intent?;
        if last.is_conversational() {
            return None;
        }

        let corrected = match &self.model {
            Some(model) => match ask_model(model, input, last).await {
                Ok(Some(params)) => with_literal_values(last, params, input.message),
                Ok(None) => {
                    debug!(intent = %last, "Model judged the message not a correction");
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "Correction check unavailable, using extractors");
                    extract_for(last, input.message, today)
                }
            },
            None => extract_for(last, input.message, today),
        };
        if corrected.is_empty() {
            return None;
        }

        let mut parameters = input.context.last_parameters.clone();
        for (name, id) in CHOSEN_IDS {
            if corrected.contains_key(*name) {
                parameters.remove(*id);
            }
        }
        for (key, value) in corrected {
            parameters.insert(key, value);
        }

        debug!(intent = %last, keys = ?parameters.keys().collect::<Vec<_>>(), "Correction applied");
        let mut result =
            IntentResult::new(last, CORRECTION_CONFIDENCE, parameters, IntentSource::Correction);
        result.is_correction = true;
        Some(result)
    }
}

/// Ask the model whether the message corrects `last`; `None` means it does not.
async fn ask_model(
    model: &ModelClassifier,
    input: &ClassifierInput<'_>,
    last: Intent,
) -> Result<Option<Parameters>, LlmError> {
    let spec = spec_for(last);
    let accepted: Vec<&str> = spec
        .required
        .iter()
        .map(|p| p.name)
        .chain(spec.optional.iter().copied())
        .collect();
    let system = format!(
        "The user may be correcting their previous request ({}: {}). \
         Previous parameters: {}.\n\
         Reply with a single JSON object and nothing else: \
         {{\"isCorrection\": true or false, \"parameters\": {{...}}}}. \
         Include only the values the user changed, using these names: {}.",
        last,
        spec.description,
        Value::Object(input.context.last_parameters.clone()),
        accepted.join(", ")
    );
    let user = format!(
        "Conversation so far:\n{}\n\nMessage: {}",
        model.history_block(input.history),
        input.message
    );

    let reply = model.ask(system, user).await?;
    let value = json_object(&reply)?;
    if !value.get("isCorrection").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(None);
    }
    let params = value
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(Some(accepted_parameters(last, params)))
}

/// Replace the model's paraphrase of emails and course with what the user
/// actually typed.
fn with_literal_values(intent: Intent, mut params: Parameters, message: &str) -> Parameters {
    let spec = spec_for(intent);
    let found = emails(message);
    if !found.is_empty() {
        if let Some(key) = EMAIL_LIST_KEYS.iter().find(|k| spec.accepts(k)) {
            params.insert(key.to_string(), json!(found));
        } else if spec.accepts(keys::STUDENT_EMAIL) {
            params.insert(keys::STUDENT_EMAIL.to_string(), json!(found[0]));
        }
    }
    if spec.accepts(keys::COURSE_NAME) {
        if let Some(course) = course_name(message) {
            params.insert(keys::COURSE_NAME.to_string(), Value::String(course));
        }
    }
    params
}
