//! Turn orchestrator: the caller-facing entry point.
//!
//! One turn holds the conversation's lock from the first context read until
//! the last write: cancel check, pending resolution, classification, action
//! execution, context patch, then the message log. `handle_turn` never
//! fails; every problem is folded into a `Failed` response.

use std::sync::Arc;

use lectern_action::handler::conversation::CANCELLED_MESSAGE;
use lectern_action::{
    match_reply, ActionOrchestrator, DialogueMachine, DialogueState, FailureKind,
    OrchestratorResponse,
};
use lectern_core::config::ChatConfig;
use lectern_core::context::{Context, ContextPatch, OngoingAction, Patch, PendingAction};
use lectern_core::intent::{Intent, IntentResult, IntentSource};
use lectern_core::taxonomy::question_for;
use lectern_core::types::{
    AuthToken, ConversationId, Message, MessageContent, MessageRole, Parameters, RequestContext,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::classifier::patterns::{is_cancel, match_rule};
use crate::classifier::{ClassifierChain, ClassifierInput};
use crate::error::{ChatError, StoreError};
use crate::history::HistoryStore;
use crate::store::{ConversationLocks, ConversationStore};

pub const NOTHING_TO_CANCEL_MESSAGE: &str = "There's nothing to cancel.";
pub const TRANSIENT_MESSAGE: &str = "Something went wrong on my side. Please try again.";

/// Result of one turn, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub conversation_id: ConversationId,
    pub response: OrchestratorResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentResult>,
    pub context: Context,
}

impl TurnResponse {
    fn failed(conversation_id: ConversationId, kind: FailureKind, message: impl Into<String>, context: Context) -> Self {
        Self {
            conversation_id,
            response: OrchestratorResponse::failed(kind, message),
            intent: None,
            context,
        }
    }
}

pub struct ChatOrchestrator {
    store: Arc<dyn ConversationStore>,
    locks: Arc<ConversationLocks>,
    classifier: ClassifierChain,
    actions: ActionOrchestrator,
    history: Option<Arc<dyn HistoryStore>>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        classifier: ClassifierChain,
        actions: ActionOrchestrator,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            locks: Arc::new(ConversationLocks::new()),
            classifier,
            actions,
            history: None,
            config,
        }
    }

    /// Mirror every message to a durable transcript store.
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<ConversationLocks> {
        &self.locks
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Whether classification can use the model stage.
    pub fn model_enabled(&self) -> bool {
        !self.classifier.is_offline()
    }

    /// Run one turn. An unknown or missing id starts a new conversation.
    pub async fn handle_turn(
        &self,
        conversation_id: Option<ConversationId>,
        message: &str,
        token: &AuthToken,
        request: &RequestContext,
    ) -> TurnResponse {
        if let Err(e) = self.validate(message) {
            // Rejected messages never create a conversation.
            let (id, context) = match conversation_id {
                Some(id) => match self.store.find(id).await {
                    Ok(Some(conversation)) => (conversation.id, conversation.context),
                    _ => (ConversationId::new(), Context::default()),
                },
                None => (ConversationId::new(), Context::default()),
            };
            debug!(conversation_id = %id, error = %e, "Rejected message");
            return TurnResponse::failed(id, FailureKind::InvalidInput, e.to_string(), context);
        }

        let conversation = match self.store.get_or_create(conversation_id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                error!(error = %e, "Failed to open conversation");
                return TurnResponse::failed(
                    conversation_id.unwrap_or_else(ConversationId::new),
                    FailureKind::Transient,
                    TRANSIENT_MESSAGE,
                    Context::default(),
                );
            }
        };
        let id = conversation.id;

        let _guard = self.locks.acquire(id).await;
        match self.run_turn(id, message.trim(), token, request).await {
            Ok(turn) => turn,
            Err(e) => {
                error!(conversation_id = %id, error = %e, "Turn failed");
                TurnResponse::failed(id, FailureKind::Transient, TRANSIENT_MESSAGE, conversation.context)
            }
        }
    }

    fn validate(&self, message: &str) -> Result<(), ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }
        Ok(())
    }

    /// The turn body. Caller holds the conversation lock.
    async fn run_turn(
        &self,
        id: ConversationId,
        message: &str,
        token: &AuthToken,
        request: &RequestContext,
    ) -> Result<TurnResponse, ChatError> {
        // Re-read under the lock: a turn queued behind another sees its writes.
        let conversation = self.store.find(id).await?.ok_or(StoreError::NotFound(id.0))?;
        let context = conversation.context;
        let mut machine = DialogueMachine::new(DialogueState::from_context(&context));

        let (intent, response) = if is_cancel(message) {
            machine.cancel();
            (
                IntentResult::new(Intent::Cancel, 1.0, Parameters::new(), IntentSource::Pattern),
                cancel_response(&context),
            )
        } else if let Some(pending) = context
            .pending_action
            .as_ref()
            .filter(|pending| !starts_new_request(pending, message))
        {
            self.resume(&mut machine, pending, message, token, request).await
        } else {
            let input = ClassifierInput {
                message,
                history: &conversation.messages,
                context: &context,
            };
            step(&mut machine, DialogueState::Classifying);
            let result = self.classifier.classify(&input).await;
            info!(
                conversation_id = %id,
                intent = %result.intent,
                source = %result.source,
                confidence = result.confidence,
                "Classified message"
            );
            step(&mut machine, DialogueState::Executing);
            let response = self.actions.execute(&result, message, token, request).await;
            let response = match &context.ongoing_action {
                Some(ongoing) if result.intent.is_conversational() && result.intent != Intent::Cancel => {
                    keep_collecting(ongoing, result.intent, response)
                }
                _ => response,
            };
            step(&mut machine, DialogueState::after(&response));
            (result, response)
        };

        let patch = patch_for(&intent, &response);
        let context = self.store.merge_context(id, patch).await?;
        debug!(
            conversation_id = %id,
            path = ?machine.path(),
            status = response.status(),
            "Turn finished"
        );

        self.record(id, MessageRole::User, MessageContent::from(message)).await?;
        self.record(id, MessageRole::Assistant, assistant_content(&response)).await?;

        Ok(TurnResponse {
            conversation_id: id,
            response,
            intent: Some(intent),
            context,
        })
    }

    async fn resume(
        &self,
        machine: &mut DialogueMachine,
        pending: &PendingAction,
        reply: &str,
        token: &AuthToken,
        request: &RequestContext,
    ) -> (IntentResult, OrchestratorResponse) {
        let matched = match_reply(reply, &pending.options).is_some();
        if matched {
            step(machine, DialogueState::Executing);
        }
        let response = self.actions.resume(pending, reply, token, request).await;
        step(machine, DialogueState::after(&response));
        let result = IntentResult::new(pending.intent, 1.0, pending.data.clone(), IntentSource::Dialogue);
        (result, response)
    }

    /// Append to the live log and, when configured, the durable transcript.
    async fn record(&self, id: ConversationId, role: MessageRole, content: MessageContent) -> Result<(), ChatError> {
        let message = self.store.append(id, role, content).await?;
        if self.config.persist_history {
            self.persist(id, &message);
        }
        Ok(())
    }

    fn persist(&self, id: ConversationId, message: &Message) {
        if let Some(history) = &self.history {
            if let Err(e) = history.append(id, message) {
                warn!(conversation_id = %id, error = %e, "Failed to persist message");
            }
        }
    }

    /// Messages of a conversation: live when present, else from the durable
    /// transcript. `None` when neither knows the id.
    pub async fn history(&self, id: ConversationId) -> Result<Option<Vec<Message>>, ChatError> {
        if let Some(conversation) = self.store.find(id).await? {
            return Ok(Some(conversation.messages));
        }
        match &self.history {
            Some(history) => {
                let messages = history.list(id)?;
                Ok((!messages.is_empty()).then_some(messages))
            }
            None => Ok(None),
        }
    }

    /// Delete a conversation and its transcript. Returns whether anything
    /// was removed.
    pub async fn delete(&self, id: ConversationId) -> Result<bool, ChatError> {
        let removed = {
            let _guard = self.locks.acquire(id).await;
            self.store.remove(id).await?
        };
        self.locks.forget(id);
        let persisted = match &self.history {
            Some(history) => history.delete(id)?,
            None => 0,
        };
        info!(conversation_id = %id, live = removed, persisted, "Deleted conversation");
        Ok(removed || persisted > 0)
    }
}

/// Record a transition; an invalid one is logged and skipped.
fn step(machine: &mut DialogueMachine, to: DialogueState) {
    if let Err(e) = machine.advance(to) {
        warn!(error = %e, "Rejected dialogue transition");
    }
}

fn cancel_response(context: &Context) -> OrchestratorResponse {
    if context.pending_action.is_some() || context.ongoing_action.is_some() {
        OrchestratorResponse::completed(CANCELLED_MESSAGE)
    } else {
        OrchestratorResponse::completed(NOTHING_TO_CANCEL_MESSAGE)
    }
}

/// Small talk while an action is collecting parameters keeps the action
/// and asks for the missing slot again.
fn keep_collecting(ongoing: &OngoingAction, intent: Intent, reply: OrchestratorResponse) -> OrchestratorResponse {
    let Some(param) = ongoing.next_missing() else {
        return reply;
    };
    let question = question_for(ongoing.action, param);
    let message = if intent == Intent::Unknown {
        format!("Sorry, I didn't catch that. {}", question)
    } else {
        format!("{}\n\n{}", reply.message(), question)
    };
    OrchestratorResponse::NeedsParameter {
        message,
        missing_parameters: ongoing.missing_parameters.clone(),
        ongoing: ongoing.clone(),
    }
}

/// A reply that matches no option but reads as a new command abandons the
/// pending question.
fn starts_new_request(pending: &PendingAction, reply: &str) -> bool {
    if match_reply(reply, &pending.options).is_some() {
        return false;
    }
    match_rule(reply).is_some_and(|rule| !rule.intent.is_conversational())
}

/// Context changes implied by a turn's outcome.
fn patch_for(intent: &IntentResult, response: &OrchestratorResponse) -> ContextPatch {
    let mut patch = match response {
        OrchestratorResponse::NeedsDisambiguation { pending, .. } => ContextPatch {
            pending_action: Patch::Set(pending.clone()),
            ongoing_action: Patch::Clear,
            ..ContextPatch::default()
        },
        OrchestratorResponse::NeedsParameter { ongoing, .. } => ContextPatch {
            pending_action: Patch::Clear,
            ongoing_action: Patch::Set(ongoing.clone()),
            ..ContextPatch::default()
        },
        OrchestratorResponse::Completed { .. } | OrchestratorResponse::Failed { .. } => {
            ContextPatch::clear_actions()
        }
    };
    // Conversational turns keep the last action for a later correction.
    if !intent.intent.is_conversational() {
        patch.last_intent = Patch::Set(intent.intent);
        patch.last_parameters = Patch::Set(intent.parameters.clone());
    }
    patch
}

fn assistant_content(response: &OrchestratorResponse) -> MessageContent {
    match serde_json::to_value(response) {
        Ok(value) => MessageContent::Structured(value),
        Err(_) => MessageContent::from(response.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::SqliteHistoryStore;
    use crate::store::{Conversation, InMemoryConversationStore};
    use async_trait::async_trait;
    use lectern_action::{BackendOp, InMemoryBackend};
    use lectern_core::types::UserRole;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Fixture {
        chat: Arc<ChatOrchestrator>,
        backend: Arc<InMemoryBackend>,
        store: Arc<InMemoryConversationStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryConversationStore::new());
            Self::with_store(store.clone(), store)
        }

        fn with_store(store: Arc<dyn ConversationStore>, inner: Arc<InMemoryConversationStore>) -> Self {
            let backend = Arc::new(InMemoryBackend::new());
            let chat = ChatOrchestrator::new(
                store,
                ClassifierChain::offline(),
                ActionOrchestrator::with_defaults(backend.clone()),
                ChatConfig::default(),
            );
            Self {
                chat: Arc::new(chat),
                backend,
                store: inner,
            }
        }

        async fn turn(&self, id: Option<ConversationId>, message: &str) -> TurnResponse {
            self.chat
                .handle_turn(id, message, &AuthToken::new("t"), &RequestContext::with_role(UserRole::Teacher))
                .await
        }
    }

    // ---- Validation ----

    #[tokio::test]
    async fn test_empty_and_oversized_messages() {
        let fx = Fixture::new();
        let turn = fx.turn(None, "   ").await;
        assert_eq!(turn.response.failure_kind(), Some(FailureKind::InvalidInput));
        assert_eq!(turn.response.message(), "message cannot be empty");

        let long = "a".repeat(ChatConfig::default().max_message_length + 1);
        let turn = fx.turn(Some(turn.conversation_id), &long).await;
        assert_eq!(turn.response.failure_kind(), Some(FailureKind::InvalidInput));
        assert_eq!(fx.backend.total_calls(), 0);
        assert_eq!(fx.store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejected_message_keeps_existing_conversation() {
        let fx = Fixture::new();
        let id = fx.turn(None, "hello").await.conversation_id;

        let turn = fx.turn(Some(id), "").await;
        assert_eq!(turn.conversation_id, id);
        assert_eq!(turn.response.failure_kind(), Some(FailureKind::InvalidInput));
        assert_eq!(fx.store.len().await.unwrap(), 1);
        let conversation = fx.store.find(id).await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_id_starts_new_conversation() {
        let fx = Fixture::new();
        let stale = ConversationId::new();
        let turn = fx.turn(Some(stale), "hello").await;
        assert_ne!(turn.conversation_id, stale);
        assert_eq!(turn.response.status(), "completed");
    }

    // ---- Simple request ----

    #[tokio::test]
    async fn test_list_my_courses_with_no_courses() {
        let fx = Fixture::new();
        let turn = fx.turn(None, "list my courses").await;

        let intent = turn.intent.unwrap();
        assert_eq!(intent.intent, Intent::ListCourses);
        assert!(intent.confidence >= 0.7);
        assert_eq!(fx.backend.calls(BackendOp::List), 1);
        assert_eq!(turn.response.status(), "completed");
        assert_eq!(turn.response.message(), "You don't have any courses yet.");
        assert!(turn.context.is_idle());
    }

    #[tokio::test]
    async fn test_messages_logged_per_turn() {
        let fx = Fixture::new();
        let turn = fx.turn(None, "list my courses").await;
        let conversation = fx.store.find(turn.conversation_id).await.unwrap().unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].content, MessageContent::from("list my courses"));
        match &conversation.messages[1].content {
            MessageContent::Structured(value) => assert_eq!(value["status"], "completed"),
            other => panic!("unexpected {:?}", other),
        }
    }

    // ---- Parameter collection ----

    #[tokio::test]
    async fn test_parameter_collection_executes_once() {
        let fx = Fixture::new();
        fx.backend.seed_course("English", "ACTIVE");

        let first = fx.turn(None, "create an assignment in English").await;
        let id = first.conversation_id;
        assert_eq!(first.response.status(), "needs_parameter");
        let ongoing = first.context.ongoing_action.as_ref().unwrap();
        assert_eq!(ongoing.action, Intent::CreateAssignment);
        assert_eq!(ongoing.missing_parameters, vec!["title".to_string()]);

        let second = fx.turn(Some(id), "Essay 1").await;
        assert_eq!(second.response.status(), "completed", "{:?}", second.response);
        assert!(second.intent.unwrap().is_parameter_collection);
        assert!(second.context.ongoing_action.is_none());
        assert_eq!(fx.backend.calls_for(BackendOp::Create, "assignment"), 1);

        let third = fx.turn(Some(id), "Essay 1").await;
        assert_ne!(third.intent.unwrap().intent, Intent::CreateAssignment);
        assert_eq!(fx.backend.calls_for(BackendOp::Create, "assignment"), 1);
    }

    #[tokio::test]
    async fn test_small_talk_keeps_collecting() {
        let fx = Fixture::new();
        fx.backend.seed_course("English", "ACTIVE");
        let id = fx.turn(None, "create an assignment in English").await.conversation_id;

        let unsure = fx
            .turn(Some(id), "hmm I am not sure what we should call it yet honestly")
            .await;
        assert_eq!(unsure.intent.as_ref().unwrap().intent, Intent::Unknown);
        assert_eq!(unsure.response.status(), "needs_parameter");
        assert!(unsure.response.message().ends_with("What is the title of the assignment?"));
        let ongoing = unsure.context.ongoing_action.as_ref().unwrap();
        assert_eq!(ongoing.action, Intent::CreateAssignment);
        assert_eq!(ongoing.missing_parameters, vec!["title".to_string()]);

        let thanks = fx.turn(Some(id), "thanks").await;
        assert_eq!(thanks.intent.as_ref().unwrap().intent, Intent::Thanks);
        assert!(thanks.response.message().starts_with("You're welcome!"));
        assert!(thanks.context.ongoing_action.is_some());
        assert_eq!(thanks.context.last_intent, Some(Intent::CreateAssignment));

        let done = fx.turn(Some(id), "Essay 1").await;
        assert_eq!(done.response.status(), "completed", "{:?}", done.response);
        assert!(done.context.ongoing_action.is_none());
        assert_eq!(fx.backend.calls_for(BackendOp::Create, "assignment"), 1);
    }

    #[tokio::test]
    async fn test_new_request_abandons_collection() {
        let fx = Fixture::new();
        fx.backend.seed_course("English", "ACTIVE");
        let id = fx.turn(None, "create an assignment in English").await.conversation_id;

        let turn = fx.turn(Some(id), "list my courses").await;
        assert_eq!(turn.intent.unwrap().intent, Intent::ListCourses);
        assert_eq!(turn.response.status(), "completed");
        assert!(turn.context.ongoing_action.is_none());
    }

    // ---- Correction ----

    #[tokio::test]
    async fn test_correction_round_trip() {
        let fx = Fixture::new();
        fx.backend.seed_course("Math 101", "ACTIVE");

        let first = fx.turn(None, "invite a@x.com to teaching 1").await;
        assert_eq!(first.response.failure_kind(), Some(FailureKind::NotFound), "{:?}", first.response);

        let second = fx
            .turn(Some(first.conversation_id), "sorry, invite b@x.com and the class is math 101")
            .await;
        let intent = second.intent.unwrap();
        assert_eq!(intent.intent, Intent::InviteStudents);
        assert!(intent.is_correction);
        assert_eq!(intent.parameters["studentEmails"], json!(["b@x.com"]));
        assert_eq!(intent.parameters["courseName"], "math 101");
        assert_eq!(second.response.status(), "completed", "{:?}", second.response);
    }

    // ---- Cancel ----

    #[tokio::test]
    async fn test_cancel_when_idle() {
        let fx = Fixture::new();
        let turn = fx.turn(None, "cancel").await;
        assert_eq!(turn.response.message(), NOTHING_TO_CANCEL_MESSAGE);
        assert_eq!(turn.intent.unwrap().intent, Intent::Cancel);
    }

    #[tokio::test]
    async fn test_cancel_clears_ongoing() {
        let fx = Fixture::new();
        fx.backend.seed_course("English", "ACTIVE");
        let first = fx.turn(None, "create an assignment in English").await;
        assert!(first.context.ongoing_action.is_some());

        let turn = fx.turn(Some(first.conversation_id), "never mind").await;
        assert_eq!(turn.response.message(), CANCELLED_MESSAGE);
        assert!(turn.context.is_idle());
        assert_eq!(turn.context.last_intent, Some(Intent::CreateAssignment));
    }

    #[tokio::test]
    async fn test_cancel_with_lead_in_clears_ongoing() {
        let fx = Fixture::new();
        fx.backend.seed_course("English", "ACTIVE");
        let id = fx.turn(None, "create an assignment in English").await.conversation_id;

        let turn = fx.turn(Some(id), "no, cancel that").await;
        assert_eq!(turn.intent.unwrap().intent, Intent::Cancel);
        assert_eq!(turn.response.message(), CANCELLED_MESSAGE);
        assert!(turn.context.is_idle());
    }

    #[tokio::test]
    async fn test_cancel_clears_pending() {
        let fx = Fixture::new();
        fx.backend.seed_course("Math 101", "ACTIVE");
        fx.backend.seed_course("Math 102", "ACTIVE");

        let first = fx.turn(None, "list assignments in math").await;
        assert_eq!(first.response.status(), "needs_disambiguation", "{:?}", first.response);
        assert!(first.context.pending_action.is_some());

        let turn = fx.turn(Some(first.conversation_id), "cancel").await;
        assert_eq!(turn.response.message(), CANCELLED_MESSAGE);
        assert!(turn.context.pending_action.is_none());
        assert!(turn.context.ongoing_action.is_none());
    }

    // ---- Disambiguation ----

    #[tokio::test]
    async fn test_pending_resolved_by_number() {
        let fx = Fixture::new();
        fx.backend.seed_course("Math 101", "ACTIVE");
        fx.backend.seed_course("Math 102", "ACTIVE");

        let first = fx.turn(None, "list assignments in math").await;
        let id = first.conversation_id;
        let calls_before = fx.backend.total_calls();

        let turn = fx.turn(Some(id), "2").await;
        assert_eq!(turn.response.status(), "completed", "{:?}", turn.response);
        assert_eq!(turn.intent.unwrap().source, IntentSource::Dialogue);
        assert!(turn.context.is_idle());
        assert!(fx.backend.total_calls() > calls_before);
    }

    #[tokio::test]
    async fn test_pending_reask_and_new_request() {
        let fx = Fixture::new();
        fx.backend.seed_course("Math 101", "ACTIVE");
        fx.backend.seed_course("Math 102", "ACTIVE");
        let id = fx.turn(None, "list assignments in math").await.conversation_id;

        let turn = fx.turn(Some(id), "the blue one").await;
        assert_eq!(turn.response.status(), "needs_disambiguation");
        assert!(turn.context.pending_action.is_some());

        let turn = fx.turn(Some(id), "list my courses").await;
        assert_eq!(turn.intent.unwrap().intent, Intent::ListCourses);
        assert!(turn.context.pending_action.is_none());
    }

    // ---- Concurrency ----

    /// Delays the first context write so a second turn queues behind it.
    struct DelayedStore {
        inner: Arc<InMemoryConversationStore>,
        delayed: AtomicBool,
    }

    #[async_trait]
    impl ConversationStore for DelayedStore {
        async fn get_or_create(&self, id: Option<ConversationId>) -> Result<Conversation, StoreError> {
            self.inner.get_or_create(id).await
        }

        async fn find(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
            self.inner.find(id).await
        }

        async fn append(
            &self,
            id: ConversationId,
            role: MessageRole,
            content: MessageContent,
        ) -> Result<Message, StoreError> {
            self.inner.append(id, role, content).await
        }

        async fn merge_context(&self, id: ConversationId, patch: ContextPatch) -> Result<Context, StoreError> {
            if !self.delayed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            self.inner.merge_context(id, patch).await
        }

        async fn remove(&self, id: ConversationId) -> Result<bool, StoreError> {
            self.inner.remove(id).await
        }

        async fn evict_stale(&self, ttl: chrono::Duration) -> Result<Vec<ConversationId>, StoreError> {
            self.inner.evict_stale(ttl).await
        }

        async fn len(&self) -> Result<usize, StoreError> {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_second_turn_sees_first_turn_context() {
        let inner = Arc::new(InMemoryConversationStore::new());
        let store = Arc::new(DelayedStore {
            inner: inner.clone(),
            delayed: AtomicBool::new(false),
        });
        let fx = Arc::new(Fixture::with_store(store, inner));
        fx.backend.seed_course("English", "ACTIVE");
        let id = fx.store.get_or_create(None).await.unwrap().id;

        let first = {
            let fx = fx.clone();
            tokio::spawn(async move { fx.turn(Some(id), "create an assignment in English").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = {
            let fx = fx.clone();
            tokio::spawn(async move { fx.turn(Some(id), "Essay 1").await })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert_eq!(first.response.status(), "needs_parameter");
        assert_eq!(second.response.status(), "completed", "{:?}", second.response);
        assert_eq!(fx.backend.calls_for(BackendOp::Create, "assignment"), 1);

        let conversation = fx.store.find(id).await.unwrap().unwrap();
        let texts: Vec<String> = conversation
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_text())
            .collect();
        assert_eq!(texts, vec!["create an assignment in English", "Essay 1"]);
    }

    // ---- History ----

    #[tokio::test]
    async fn test_history_mirrored_and_deleted() {
        let store = Arc::new(InMemoryConversationStore::new());
        let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let backend = Arc::new(InMemoryBackend::new());
        let chat = ChatOrchestrator::new(
            store.clone(),
            ClassifierChain::offline(),
            ActionOrchestrator::with_defaults(backend),
            ChatConfig::default(),
        )
        .with_history(history.clone());

        let turn = chat
            .handle_turn(None, "hello", &AuthToken::new("t"), &RequestContext::default())
            .await;
        let id = turn.conversation_id;
        assert_eq!(history.list(id).unwrap().len(), 2);

        // Evicted from memory, still served from the transcript.
        store.remove(id).await.unwrap();
        let messages = chat.history(id).await.unwrap().unwrap();
        assert_eq!(messages[0].content, MessageContent::from("hello"));

        assert!(chat.delete(id).await.unwrap());
        assert!(chat.history(id).await.unwrap().is_none());
        assert!(!chat.delete(id).await.unwrap());
    }
}
