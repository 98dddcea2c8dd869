//! Per-conversation dialogue context and the patch type used to update it.
//!
//! A conversation carries at most one pending disambiguation and at most one
//! ongoing (partially filled) action. Both may be set at the same time; the
//! pending action is always resolved first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::intent::Intent;
use crate::types::Parameters;

// =============================================================================
// Context
// =============================================================================

/// Mutable context bag owned by a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Parameters::is_empty")]
    pub last_parameters: Parameters,
    #[serde(default)]
    pub pending_action: Option<PendingAction>,
    #[serde(default)]
    pub ongoing_action: Option<OngoingAction>,
}

impl Context {
    /// True when no partial dialogue is in progress.
    pub fn is_idle(&self) -> bool {
        self.pending_action.is_none() && self.ongoing_action.is_none()
    }
}

/// One entity offered to the user during disambiguation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityOption {
    pub id: String,
    pub display_name: String,
    /// Extra fields shown next to the name so duplicates can be told apart.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl EntityOption {
    /// Single-line label, e.g. `Math 101 (section: B, state: ACTIVE)`.
    pub fn label(&self) -> String {
        if self.attributes.is_empty() {
            return self.display_name.clone();
        }
        let extras: Vec<String> = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        format!("{} ({})", self.display_name, extras.join(", "))
    }
}

/// An action blocked on a disambiguation choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    /// The intent to re-execute once an option is chosen.
    #[serde(rename = "type")]
    pub intent: Intent,
    /// Parameter key the chosen option's id is bound to (e.g. `courseId`).
    pub binds: String,
    pub options: Vec<EntityOption>,
    /// Parameters already known when the question was asked.
    #[serde(default)]
    pub data: Parameters,
}

/// An intent recognized but still missing required slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OngoingAction {
    pub action: Intent,
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub collected_parameters: Parameters,
    pub missing_parameters: Vec<String>,
}

impl OngoingAction {
    /// Start collecting for `action` with whatever was already extracted.
    pub fn new(action: Intent, required: &[&str], collected: Parameters) -> Self {
        let mut ongoing = Self {
            action,
            required_parameters: required.iter().map(|s| s.to_string()).collect(),
            collected_parameters: collected,
            missing_parameters: Vec::new(),
        };
        ongoing.recompute_missing();
        ongoing
    }

    /// Merge newly supplied values; later values win.
    pub fn merge(&mut self, params: &Parameters) {
        for (key, value) in params {
            self.collected_parameters.insert(key.clone(), value.clone());
        }
        self.recompute_missing();
    }

    pub fn is_complete(&self) -> bool {
        self.missing_parameters.is_empty()
    }

    /// First slot that still needs a value.
    pub fn next_missing(&self) -> Option<&str> {
        self.missing_parameters.first().map(String::as_str)
    }

    fn recompute_missing(&mut self) {
        self.missing_parameters = self
            .required_parameters
            .iter()
            .filter(|key| !has_value(&self.collected_parameters, key))
            .cloned()
            .collect();
    }
}

/// True when `key` holds a non-empty string, a non-empty array, or any
/// other non-null value.
pub fn has_value(params: &Parameters, key: &str) -> bool {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
        Some(serde_json::Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

// =============================================================================
// ContextPatch
// =============================================================================

/// Three-way field update: leave alone, remove, or replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(value) => *slot = Some(value),
        }
    }
}

/// Shallow update to a [`Context`]; unspecified fields are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    pub last_intent: Patch<Intent>,
    pub last_parameters: Patch<Parameters>,
    pub pending_action: Patch<PendingAction>,
    pub ongoing_action: Patch<OngoingAction>,
}

impl ContextPatch {
    /// Patch that drops both partial dialogues.
    pub fn clear_actions() -> Self {
        Self {
            pending_action: Patch::Clear,
            ongoing_action: Patch::Clear,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, context: &mut Context) {
        self.last_intent.apply_to(&mut context.last_intent);
        match self.last_parameters {
            Patch::Keep => {}
            Patch::Clear => context.last_parameters.clear(),
            Patch::Set(params) => context.last_parameters = params,
        }
        self.pending_action.apply_to(&mut context.pending_action);
        self.ongoing_action.apply_to(&mut context.ongoing_action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    fn pending() -> PendingAction {
        PendingAction {
            intent: Intent::InviteStudents,
            binds: "courseId".into(),
            options: vec![EntityOption {
                id: "c1".into(),
                display_name: "Math 101".into(),
                attributes: BTreeMap::new(),
            }],
            data: params(json!({"studentEmails": ["a@x.com"]})),
        }
    }

    // ---- OngoingAction ----

    #[test]
    fn test_ongoing_action_computes_missing() {
        let ongoing = OngoingAction::new(
            Intent::CreateAnnouncement,
            &["courseName", "text"],
            params(json!({"courseName": "Math"})),
        );
        assert_eq!(ongoing.missing_parameters, vec!["text".to_string()]);
        assert_eq!(ongoing.next_missing(), Some("text"));
        assert!(!ongoing.is_complete());
    }

    #[test]
    fn test_ongoing_action_merge_completes() {
        let mut ongoing =
            OngoingAction::new(Intent::CreateAnnouncement, &["courseName", "text"], Parameters::new());
        assert_eq!(ongoing.missing_parameters.len(), 2);
        ongoing.merge(&params(json!({"courseName": "Math", "text": "Quiz Friday"})));
        assert!(ongoing.is_complete());
        assert_eq!(ongoing.next_missing(), None);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let ongoing = OngoingAction::new(
            Intent::InviteStudents,
            &["studentEmails", "courseName"],
            params(json!({"studentEmails": [], "courseName": "  "})),
        );
        assert_eq!(ongoing.missing_parameters.len(), 2);
    }

    // ---- ContextPatch ----

    #[test]
    fn test_default_patch_is_noop() {
        let mut ctx = Context {
            last_intent: Some(Intent::ListCourses),
            pending_action: Some(pending()),
            ..Context::default()
        };
        let before = ctx.clone();
        let patch = ContextPatch::default();
        assert!(patch.is_noop());
        patch.apply(&mut ctx);
        assert_eq!(ctx, before);
    }

    #[test]
    fn test_clear_actions_clears_both() {
        let mut ctx = Context {
            last_intent: Some(Intent::InviteStudents),
            pending_action: Some(pending()),
            ongoing_action: Some(OngoingAction::new(Intent::CreateCourse, &["courseName"], Parameters::new())),
            ..Context::default()
        };
        ContextPatch::clear_actions().apply(&mut ctx);
        assert!(ctx.is_idle());
        assert_eq!(ctx.last_intent, Some(Intent::InviteStudents));
    }

    #[test]
    fn test_set_replaces_and_keep_preserves() {
        let mut ctx = Context {
            last_parameters: params(json!({"courseName": "old"})),
            ..Context::default()
        };
        ContextPatch {
            last_intent: Patch::Set(Intent::ShowRoster),
            pending_action: Patch::Set(pending()),
            ..ContextPatch::default()
        }
        .apply(&mut ctx);
        assert_eq!(ctx.last_intent, Some(Intent::ShowRoster));
        assert!(ctx.pending_action.is_some());
        assert_eq!(ctx.last_parameters["courseName"], "old");
    }

    #[test]
    fn test_clear_last_parameters() {
        let mut ctx = Context {
            last_parameters: params(json!({"courseName": "old"})),
            ..Context::default()
        };
        ContextPatch {
            last_parameters: Patch::Clear,
            ..ContextPatch::default()
        }
        .apply(&mut ctx);
        assert!(ctx.last_parameters.is_empty());
    }

    // ---- Serialization ----

    #[test]
    fn test_context_json_is_camel_case() {
        let ctx = Context {
            last_intent: Some(Intent::InviteStudents),
            pending_action: Some(pending()),
            ..Context::default()
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["lastIntent"], "INVITE_STUDENTS");
        assert_eq!(json["pendingAction"]["type"], "INVITE_STUDENTS");
        assert_eq!(json["pendingAction"]["options"][0]["displayName"], "Math 101");
        assert!(json["ongoingAction"].is_null());
    }

    #[test]
    fn test_entity_option_label() {
        let mut option = EntityOption {
            id: "1".into(),
            display_name: "Math 101".into(),
            attributes: BTreeMap::new(),
        };
        assert_eq!(option.label(), "Math 101");
        option.attributes.insert("section".into(), "B".into());
        assert_eq!(option.label(), "Math 101 (section: B)");
    }
}
