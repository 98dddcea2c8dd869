//! Durable transcript storage.
//!
//! The conversation store keeps live state in memory; [`HistoryStore`]
//! mirrors each message to SQLite so transcripts outlive eviction and
//! restarts. Only messages are persisted, never dialogue context.

use std::path::Path;
use std::sync::Mutex;

use lectern_core::types::{ConversationId, Message, MessageContent, MessageRole, Timestamp};
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

use crate::error::ChatError;

pub trait HistoryStore: Send + Sync {
    fn append(&self, conversation: ConversationId, message: &Message) -> Result<(), ChatError>;

    /// Messages in the order they were appended.
    fn list(&self, conversation: ConversationId) -> Result<Vec<Message>, ChatError>;

    /// Delete a transcript, returning the number of messages removed.
    fn delete(&self, conversation: ConversationId) -> Result<usize, ChatError>;
}

/// SQLite-backed transcript store.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open (or create) the history database at `path`.
    pub fn new(path: &Path) -> Result<Self, ChatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::History(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ChatError::History(format!("Failed to open database: {}", e)))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| ChatError::History(format!("Failed to set pragmas: {}", e)))?;

        info!("History database opened at {}", path.display());
        Self::with_connection(conn)
    }

    /// In-memory database (for testing).
    pub fn in_memory() -> Result<Self, ChatError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChatError::History(format!("Failed to open in-memory db: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ChatError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn(run_migrations)?;
        Ok(store)
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Connection) -> Result<T, ChatError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ChatError::History(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, conversation: ConversationId, message: &Message) -> Result<(), ChatError> {
        let content = serde_json::to_string(&message.content)
            .map_err(|e| ChatError::History(format!("Failed to encode message: {}", e)))?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id.to_string(),
                    conversation.to_string(),
                    message.role.to_string(),
                    content,
                    message.timestamp.0,
                ],
            )?;
            Ok(())
        })
    }

    fn list(&self, conversation: ConversationId) -> Result<Vec<Message>, ChatError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, timestamp FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![conversation.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (id, role, content, timestamp) = row?;
                messages.push(decode_message(&id, &role, &content, timestamp)?);
            }
            Ok(messages)
        })
    }

    fn delete(&self, conversation: ConversationId) -> Result<usize, ChatError> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![conversation.to_string()],
            )?;
            Ok(removed)
        })
    }
}

fn decode_message(id: &str, role: &str, content: &str, timestamp: i64) -> Result<Message, ChatError> {
    let id = Uuid::parse_str(id).map_err(|e| ChatError::History(format!("Bad message id {}: {}", id, e)))?;
    let role: MessageRole = role.parse().map_err(ChatError::History)?;
    let content: MessageContent = serde_json::from_str(content)
        .map_err(|e| ChatError::History(format!("Bad message content: {}", e)))?;
    Ok(Message {
        id,
        role,
        content,
        timestamp: Timestamp(timestamp),
    })
}

// =============================================================================
// Migrations
// =============================================================================

fn run_migrations(conn: &Connection) -> Result<(), ChatError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ChatError::History(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ChatError::History(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: messages");
    }
    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<(), ChatError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL,
            role            TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content         TEXT NOT NULL,
            timestamp       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, seq);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'messages');
        ",
    )
    .map_err(|e| ChatError::History(format!("Failed to apply v1 migration: {}", e)))
}
