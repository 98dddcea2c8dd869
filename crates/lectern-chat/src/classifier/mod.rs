//! Classifier chain: correction, continuation, model, then patterns.
//!
//! The first stage that produces a result wins. The model stage is optional;
//! without it the chain runs fully offline. A model result below the
//! configured confidence floor yields to a pattern match when one exists.

pub mod continuation;
pub mod correction;
pub mod extract;
pub mod model;
pub mod patterns;

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use lectern_core::config::{ChatConfig, LlmConfig};
use lectern_core::context::Context;
use lectern_core::intent::{Intent, IntentResult};
use lectern_core::types::Message;
use tracing::{debug, warn};

use crate::llm::LlmClient;
use continuation::ContinuationDetector;
use correction::CorrectionDetector;
use model::ModelClassifier;
use patterns::PatternClassifier;

/// Everything a classifier stage may look at.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub message: &'a str,
    pub history: &'a [Message],
    pub context: &'a Context,
}

pub struct ClassifierChain {
    correction: CorrectionDetector,
    continuation: ContinuationDetector,
    model: Option<Arc<ModelClassifier>>,
    patterns: PatternClassifier,
    min_model_confidence: f32,
}

impl ClassifierChain {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, chat: &ChatConfig, llm_config: &LlmConfig) -> Self {
        let model = llm
            .filter(|_| llm_config.enabled)
            .map(|client| Arc::new(ModelClassifier::new(client, llm_config, chat.history_turns)));
        Self {
            correction: CorrectionDetector::new(model.clone()),
            continuation: ContinuationDetector::new(),
            model,
            patterns: PatternClassifier::new(),
            min_model_confidence: chat.min_model_confidence,
        }
    }

    /// Pattern-only chain.
    pub fn offline() -> Self {
        Self::new(None, &ChatConfig::default(), &LlmConfig::default())
    }

    pub fn is_offline(&self) -> bool {
        self.model.is_none()
    }

    pub async fn classify(&self, input: &ClassifierInput<'_>) -> IntentResult {
        self.classify_on(input, Local::now().date_naive()).await
    }

    /// Classify with relative dates resolved against `today`.
    pub async fn classify_on(&self, input: &ClassifierInput<'_>, today: NaiveDate) -> IntentResult {
        if let Some(result) = self.correction.detect(input, today).await {
            return result;
        }
        if let Some(result) = self.continuation.detect(input, today) {
            return result;
        }

        let fallback = self.patterns.classify_on(input.message, today);
        let Some(model) = &self.model else {
            return fallback;
        };

        match model.classify(input, today).await {
            Ok(result)
                if result.confidence >= self.min_model_confidence
                    || fallback.intent == Intent::Unknown =>
            {
                result
            }
            Ok(result) => {
                debug!(
                    model_intent = %result.intent,
                    model_confidence = result.confidence,
                    pattern_intent = %fallback.intent,
                    "Low-confidence model result, using pattern match"
                );
                fallback
            }
            Err(e) => {
                warn!(error = %e, "Model classification unavailable, using patterns");
                fallback
            }
        }
    }
}
