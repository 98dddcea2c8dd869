//! Conversation state store.
//!
//! [`ConversationStore`] holds each conversation's message log and context.
//! Per-conversation turn ordering is not the store's job: the turn
//! orchestrator serializes turns with [`ConversationLocks`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lectern_core::context::{Context, ContextPatch};
use lectern_core::types::{ConversationId, Message, MessageContent, MessageRole, Timestamp};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::StoreError;

/// One conversation: ordered messages plus the dialogue context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub messages: Vec<Message>,
    pub context: Context,
    pub created_at: Timestamp,
    pub last_activity: Timestamp,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            context: Context::default(),
            created_at: now,
            last_activity: now,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Look up `id`, or create a conversation with a fresh id when `id` is
    /// absent or unknown.
    async fn get_or_create(&self, id: Option<ConversationId>) -> Result<Conversation, StoreError>;

    async fn find(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Append a message and mark the conversation active.
    async fn append(
        &self,
        id: ConversationId,
        role: MessageRole,
        content: MessageContent,
    ) -> Result<Message, StoreError>;

    /// Apply `patch` to the context and return the result.
    async fn merge_context(&self, id: ConversationId, patch: ContextPatch) -> Result<Context, StoreError>;

    /// Delete a conversation; `false` when it did not exist.
    async fn remove(&self, id: ConversationId) -> Result<bool, StoreError>;

    /// Drop conversations idle for longer than `ttl`, returning their ids.
    async fn evict_stale(&self, ttl: chrono::Duration) -> Result<Vec<ConversationId>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut HashMap<ConversationId, Conversation>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut map = self
            .conversations
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        f(&mut map)
    }

    /// Move a conversation's last activity into the past.
    #[cfg(test)]
    pub(crate) fn backdate(&self, id: ConversationId, secs: i64) {
        if let Ok(mut map) = self.conversations.lock() {
            if let Some(c) = map.get_mut(&id) {
                c.last_activity = Timestamp(c.last_activity.0 - secs);
            }
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_or_create(&self, id: Option<ConversationId>) -> Result<Conversation, StoreError> {
        self.with_map(|map| {
            if let Some(existing) = id.and_then(|id| map.get(&id)) {
                return Ok(existing.clone());
            }
            let conversation = Conversation::new();
            if let Some(requested) = id {
                debug!(requested = %requested, id = %conversation.id, "Unknown conversation, starting a new one");
            }
            map.insert(conversation.id, conversation.clone());
            Ok(conversation)
        })
    }

    async fn find(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        self.with_map(|map| Ok(map.get(&id).cloned()))
    }

    async fn append(
        &self,
        id: ConversationId,
        role: MessageRole,
        content: MessageContent,
    ) -> Result<Message, StoreError> {
        self.with_map(|map| {
            let conversation = map.get_mut(&id).ok_or(StoreError::NotFound(id.0))?;
            let message = Message::new(role, content);
            conversation.last_activity = message.timestamp;
            conversation.messages.push(message.clone());
            Ok(message)
        })
    }

    async fn merge_context(&self, id: ConversationId, patch: ContextPatch) -> Result<Context, StoreError> {
        self.with_map(|map| {
            let conversation = map.get_mut(&id).ok_or(StoreError::NotFound(id.0))?;
            patch.apply(&mut conversation.context);
            conversation.last_activity = Timestamp::now();
            Ok(conversation.context.clone())
        })
    }

    async fn remove(&self, id: ConversationId) -> Result<bool, StoreError> {
        self.with_map(|map| Ok(map.remove(&id).is_some()))
    }

    async fn evict_stale(&self, ttl: chrono::Duration) -> Result<Vec<ConversationId>, StoreError> {
        let cutoff = ttl.num_seconds();
        self.with_map(|map| {
            let stale: Vec<ConversationId> = map
                .values()
                .filter(|c| c.last_activity.age_secs() > cutoff)
                .map(|c| c.id)
                .collect();
            for id in &stale {
                map.remove(id);
            }
            if !stale.is_empty() {
                info!(evicted = stale.len(), remaining = map.len(), "Evicted idle conversations");
            }
            Ok(stale)
        })
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.with_map(|map| Ok(map.len()))
    }
}

// =============================================================================
// Per-conversation turn locks
// =============================================================================

/// Keyed async mutexes; holding a guard serializes turns for one id.
///
/// Tokio mutexes are fair, so waiting turns run in arrival order.
#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<ConversationId, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry for a removed conversation.
    pub fn forget(&self, id: ConversationId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&id);
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
