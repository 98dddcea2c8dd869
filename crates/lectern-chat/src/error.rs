//! Error types for the dialogue layer.

use lectern_core::error::LecternError;

/// Errors from validating and running a turn.
///
/// `handle_turn` folds these into a failed response; they only escape from
/// the lower-level store and history APIs.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("conversation store error: {0}")]
    Store(#[from] StoreError),
    #[error("history error: {0}")]
    History(String),
}

/// Errors from a [`ConversationStore`](crate::store::ConversationStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(uuid::Uuid),
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::History(err.to_string())
    }
}

impl From<ChatError> for LecternError {
    fn from(err: ChatError) -> Self {
        LecternError::Storage(err.to_string())
    }
}
