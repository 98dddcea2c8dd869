//! Route handlers and their request/response bodies.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use lectern_core::types::{AuthToken, ConversationId, Message, RequestContext};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{status_for, ApiError};
use crate::state::AppState;

// =============================================================================
// Chat
// =============================================================================

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Omit to start a new conversation.
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub message: String,
}

/// POST /chat - run one turn.
///
/// The body is always the turn; a failed turn carries a non-2xx status.
/// The caller's role comes from [`crate::auth::require_bearer`], never from
/// the body.
pub async fn chat(
    State(state): State<AppState>,
    Extension(token): Extension<AuthToken>,
    Extension(caller): Extension<RequestContext>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let turn = state
        .chat
        .handle_turn(
            req.conversation_id.map(ConversationId),
            &req.message,
            &token,
            &caller,
        )
        .await;
    let status = status_for(&turn.response);
    info!(
        conversation_id = %turn.conversation_id,
        role = %caller.role,
        status = turn.response.status(),
        http_status = status.as_u16(),
        "Chat turn served"
    );
    (status, Json(turn)).into_response()
}

/// Response body for GET /chat/{id}/history.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
}

/// GET /chat/{id}/history
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let id = parse_id(&id)?;
    let messages = state
        .chat
        .history(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", id)))?;
    Ok(Json(HistoryResponse {
        conversation_id: id.0,
        messages,
    }))
}

/// DELETE /chat/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if state.chat.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Conversation {} not found", id)))
    }
}

fn parse_id(raw: &str) -> Result<ConversationId, ApiError> {
    Uuid::parse_str(raw)
        .map(ConversationId)
        .map_err(|_| ApiError::BadRequest(format!("Invalid conversation id: {}", raw)))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_conversations: usize,
    pub model_enabled: bool,
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let active = state.chat.store().len().await.map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_conversations: active,
        model_enabled: state.chat.model_enabled(),
    }))
}
