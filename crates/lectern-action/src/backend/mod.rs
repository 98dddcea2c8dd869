//! Backend collaborator contract.
//!
//! Every call carries the caller's bearer token; implementations never cache
//! entities between calls.

pub mod http;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use lectern_core::types::AuthToken;
use serde_json::Value;

use crate::types::{Entity, EntityKind};

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

/// Operation names, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    List,
    Get,
    Create,
    Update,
    Patch,
    Delete,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendOp::List => write!(f, "list"),
            BackendOp::Get => write!(f, "get"),
            BackendOp::Create => write!(f, "create"),
            BackendOp::Update => write!(f, "update"),
            BackendOp::Patch => write!(f, "patch"),
            BackendOp::Delete => write!(f, "delete"),
        }
    }
}

/// Errors surfaced by a backend collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Backend request timed out")]
    Timeout,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

/// How an error should be handled by the dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Remote entity state blocks the operation.
    Precondition,
    Transient,
    Permission,
    NotFound,
    Rejected,
}

impl BackendError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        BackendError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            BackendError::Http { status, message } => match status {
                412 => ErrorClass::Precondition,
                400 if message.to_lowercase().contains("precondition") => {
                    ErrorClass::Precondition
                }
                401 | 403 => ErrorClass::Permission,
                404 => ErrorClass::NotFound,
                408 | 429 => ErrorClass::Transient,
                s if *s >= 500 => ErrorClass::Transient,
                _ => ErrorClass::Rejected,
            },
            BackendError::Timeout | BackendError::Transport(_) | BackendError::Decode(_) => {
                ErrorClass::Transient
            }
        }
    }

    /// The backend's own message when it is short, human text.
    pub fn clean_message(&self) -> Option<&str> {
        match self {
            BackendError::Http { message, .. } => {
                let trimmed = message.trim();
                let clean = !trimmed.is_empty()
                    && trimmed.len() <= 200
                    && !trimmed.contains(['{', '<', '\n'])
                    && !trimmed.to_lowercase().contains("exception");
                clean.then_some(trimmed)
            }
            _ => None,
        }
    }
}

/// Entity service the action handlers talk to.
#[async_trait]
pub trait BackendService: Send + Sync {
    async fn list(&self, token: &AuthToken, kind: &EntityKind) -> Result<Vec<Entity>, BackendError>;

    async fn get(&self, token: &AuthToken, kind: &EntityKind, id: &str) -> Result<Entity, BackendError>;

    async fn create(&self, token: &AuthToken, kind: &EntityKind, body: Value) -> Result<Entity, BackendError>;

    async fn update(
        &self,
        token: &AuthToken,
        kind: &EntityKind,
        id: &str,
        body: Value,
    ) -> Result<Entity, BackendError>;

    /// Partial update; only the fields present in `body` change.
    async fn patch(
        &self,
        token: &AuthToken,
        kind: &EntityKind,
        id: &str,
        body: Value,
    ) -> Result<Entity, BackendError>;

    async fn delete(&self, token: &AuthToken, kind: &EntityKind, id: &str) -> Result<(), BackendError>;
}
