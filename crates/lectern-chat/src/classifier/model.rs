//! Model-backed classification.
//!
//! Builds one prompt from the intent table, sends it with the recent
//! history, and parses the JSON reply. Every failure is returned as an
//! [`LlmError`] so the chain can fall through to the pattern stage.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use lectern_core::config::LlmConfig;
use lectern_core::intent::{Intent, IntentResult, IntentSource};
use lectern_core::taxonomy::{spec_for, INTENT_TABLE};
use lectern_core::types::{Message, Parameters};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::ClassifierInput;
use crate::llm::{LlmClient, LlmError, LlmRequest};

const DEFAULT_CONFIDENCE: f32 = 0.7;

pub struct ModelClassifier {
    llm: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    timeout: Duration,
    history_turns: usize,
}

impl ModelClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, config: &LlmConfig, history_turns: usize) -> Self {
        Self {
            llm,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            history_turns,
        }
    }

    /// One bounded request to the model.
    pub(crate) async fn ask(&self, system: String, user: String) -> Result<String, LlmError> {
        let request = LlmRequest {
            system,
            user,
            model: self.model.clone(),
            temperature: self.temperature,
        };
        tokio::time::timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout)?
    }

    /// Role-tagged transcript of the most recent messages.
    pub(crate) fn history_block(&self, history: &[Message]) -> String {
        let start = history.len().saturating_sub(self.history_turns);
        history[start..]
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content.as_text()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn classify(
        &self,
        input: &ClassifierInput<'_>,
        today: NaiveDate,
    ) -> Result<IntentResult, LlmError> {
        let mut user = String::new();
        let history = self.history_block(input.history);
        if !history.is_empty() {
            let _ = write!(user, "Conversation so far:\n{}\n\n", history);
        }
        let _ = write!(user, "Message: {}", input.message);

        let reply = self.ask(system_prompt(today), user).await?;
        debug!(reply = %reply, "Model classification reply");
        parse_response(&reply)
    }
}

/// Classification prompt listing every intent with its parameter contract.
pub fn system_prompt(today: NaiveDate) -> String {
    let mut prompt = format!(
        "You classify messages sent to a course-management assistant. Today is {}.\n\
         Reply with a single JSON object and nothing else:\n\
         {{\"intent\": \"<INTENT>\", \"confidence\": <number between 0 and 1>, \"parameters\": {{...}}}}\n\
         Use camelCase parameter names exactly as listed. Dates are YYYY-MM-DD, times HH:MM (24h).\n\
         Email lists are JSON arrays. Omit parameters the message does not mention.\n\n\
         Intents:\n",
        today.format("%Y-%m-%d")
    );
    for spec in INTENT_TABLE {
        let _ = write!(prompt, "- {}: {}.", spec.intent, spec.description);
        if !spec.required.is_empty() {
            let _ = write!(prompt, " Required: {}.", spec.required_names().join(", "));
        }
        if !spec.optional.is_empty() {
            let _ = write!(prompt, " Optional: {}.", spec.optional.join(", "));
        }
        if !spec.hints.is_empty() {
            let _ = write!(prompt, " Examples: {}.", spec.hints.join("; "));
        }
        prompt.push('\n');
    }
    prompt
}

#[derive(Deserialize)]
struct RawClassification {
    intent: String,
    confidence: Option<f32>,
    #[serde(default)]
    parameters: Option<serde_json::Map<String, Value>>,
}

/// Parse a classification reply, tolerating code fences and prose around
/// the JSON object.
pub fn parse_response(text: &str) -> Result<IntentResult, LlmError> {
    let value = json_object(text)?;
    let raw: RawClassification =
        serde_json::from_value(value).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let intent: Intent = raw.intent.parse().map_err(LlmError::InvalidResponse)?;
    let parameters = accepted_parameters(intent, raw.parameters.unwrap_or_default());
    Ok(IntentResult::new(
        intent,
        raw.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        parameters,
        IntentSource::Model,
    ))
}

/// The outermost `{ ... }` span of `text`, parsed.
pub(crate) fn json_object(text: &str) -> Result<Value, LlmError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(LlmError::InvalidResponse("no JSON object in reply".to_string()));
    };
    if end < start {
        return Err(LlmError::InvalidResponse("no JSON object in reply".to_string()));
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

/// Keep non-null values for keys the intent understands.
pub(crate) fn accepted_parameters(intent: Intent, raw: serde_json::Map<String, Value>) -> Parameters {
    let spec = spec_for(intent);
    raw.into_iter()
        .filter(|(k, v)| !v.is_null() && spec.accepts(k))
        .collect()
}
