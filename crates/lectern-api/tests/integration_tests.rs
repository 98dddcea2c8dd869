//! Integration tests for the Lectern HTTP surface.
//!
//! Every test builds its own router over an in-memory conversation store,
//! an in-memory backend and the offline classifier.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use lectern_action::{ActionOrchestrator, BackendOp, InMemoryBackend};
use lectern_api::create_router;
use lectern_api::handlers::{HealthResponse, HistoryResponse};
use lectern_api::state::AppState;
use lectern_chat::{ChatOrchestrator, ClassifierChain, InMemoryConversationStore, SqliteHistoryStore};
use lectern_core::config::LecternConfig;

// =============================================================================
// Helpers
// =============================================================================

const TEST_TOKEN: &str = "test-token-12345";

const GATEWAY_KEY: &str = "gateway-secret";

fn make_state() -> (AppState, Arc<InMemoryBackend>) {
    let config = LecternConfig::default();
    let backend = Arc::new(InMemoryBackend::new());
    let chat = ChatOrchestrator::new(
        Arc::new(InMemoryConversationStore::new()),
        ClassifierChain::offline(),
        ActionOrchestrator::with_defaults(backend.clone()),
        config.chat.clone(),
    )
    .with_history(Arc::new(SqliteHistoryStore::in_memory().unwrap()));
    let state = AppState::new(Arc::new(chat), config).with_gateway_key(GATEWAY_KEY);
    (state, backend)
}

fn make_app() -> (axum::Router, Arc<InMemoryBackend>) {
    let (state, backend) = make_state();
    (create_router(state), backend)
}

fn chat_request(body: Value) -> Request<Body> {
    Request::post("/chat")
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// A turn whose identity a trusted gateway vouches for.
fn gateway_turn(role: &str, conversation_id: Option<&str>, message: &str) -> Request<Body> {
    Request::post("/chat")
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .header("content-type", "application/json")
        .header("x-gateway-key", GATEWAY_KEY)
        .header("x-user-role", role)
        .header("x-user-email", "t@school.edu")
        .body(Body::from(
            json!({"conversationId": conversation_id, "message": message}).to_string(),
        ))
        .unwrap()
}

fn teacher_turn(conversation_id: Option<&str>, message: &str) -> Request<Body> {
    gateway_turn("teacher", conversation_id, message)
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn authed_delete(uri: &str) -> Request<Body> {
    Request::delete(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_no_auth_required() {
    let (app, _) = make_app();
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_conversations, 0);
    assert!(!health.model_enabled);
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_chat_requires_bearer_token() {
    let (app, backend) = make_app();
    let resp = app
        .oneshot(
            Request::post("/chat")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"message": "list my courses"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_non_bearer_scheme_rejected() {
    let (app, _) = make_app();
    let resp = app
        .oneshot(
            Request::get("/chat/00000000-0000-0000-0000-000000000000/history")
                .header("authorization", "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// POST /chat
// =============================================================================

#[tokio::test]
async fn test_chat_list_courses() {
    let (app, backend) = make_app();
    backend.seed_course("Math 101", "ACTIVE");

    let resp = app.oneshot(teacher_turn(None, "list my courses")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert!(body["conversationId"].is_string());
    assert_eq!(body["response"]["status"], "completed");
    assert!(body["response"]["message"].as_str().unwrap().contains("Math 101"));
    assert_eq!(body["intent"]["intent"], "LIST_COURSES");
    assert_eq!(backend.calls(BackendOp::List), 1);
}

#[tokio::test]
async fn test_chat_needs_parameter_then_completes() {
    let (state, backend) = make_state();
    backend.seed_course("English", "ACTIVE");
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(teacher_turn(None, "create an assignment in English"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["response"]["status"], "needs_parameter");
    assert_eq!(body["response"]["missingParameters"], json!(["title"]));
    assert_eq!(body["context"]["ongoingAction"]["action"], "CREATE_ASSIGNMENT");
    let id = body["conversationId"].as_str().unwrap().to_string();

    let resp = app.oneshot(teacher_turn(Some(&id), "Essay 1")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["conversationId"], id.as_str());
    assert_eq!(body["response"]["status"], "completed");
    assert!(body["context"]["ongoingAction"].is_null());
    assert_eq!(backend.calls_for(BackendOp::Create, "assignment"), 1);
}

#[tokio::test]
async fn test_chat_student_denied_mutation() {
    let (app, backend) = make_app();
    backend.seed_course("Math 101", "ACTIVE");

    // No gateway identity: the caller is treated as a student.
    let resp = app
        .oneshot(chat_request(json!({"message": "create a course called Physics"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["response"]["status"], "failed");
    assert_eq!(body["response"]["error"], "unauthorized");
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_chat_body_role_is_ignored() {
    let (app, backend) = make_app();
    backend.seed_course("Math 101", "ACTIVE");

    let resp = app
        .oneshot(chat_request(json!({
            "message": "invite teacher t@x.com to Math 101",
            "requestContext": {"role": "super_admin"},
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["intent"]["intent"], "INVITE_TEACHERS");
    assert_eq!(body["response"]["error"], "unauthorized");
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_chat_gateway_super_admin_invites_teacher() {
    let (app, backend) = make_app();
    backend.seed_course("Math 101", "ACTIVE");

    let resp = app
        .oneshot(gateway_turn("super_admin", None, "invite teacher t@x.com to Math 101"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["intent"]["intent"], "INVITE_TEACHERS");
    assert_eq!(body["response"]["status"], "completed");
    assert_eq!(backend.calls_for(BackendOp::Create, "invitation"), 1);
}

#[tokio::test]
async fn test_chat_wrong_gateway_key_rejected() {
    let (app, backend) = make_app();
    let resp = app
        .oneshot(
            Request::post("/chat")
                .header("authorization", format!("Bearer {}", TEST_TOKEN))
                .header("content-type", "application/json")
                .header("x-gateway-key", "guessed")
                .header("x-user-role", "super_admin")
                .body(Body::from(r#"{"message": "list my courses"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_chat_not_found_maps_to_404() {
    let (app, _) = make_app();
    let resp = app
        .oneshot(teacher_turn(None, "list assignments in Basket Weaving"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["response"]["error"], "not_found");
}

#[tokio::test]
async fn test_chat_empty_message_is_bad_request() {
    let (app, _) = make_app();
    let resp = app.oneshot(teacher_turn(None, "   ")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["response"]["error"], "invalid_input");
}

#[tokio::test]
async fn test_chat_backend_outage_is_unavailable() {
    let (app, backend) = make_app();
    backend.fail_next(BackendOp::List, None, lectern_action::BackendError::Timeout);

    let resp = app.oneshot(teacher_turn(None, "list my courses")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["response"]["error"], "transient");
}

// =============================================================================
// History and deletion
// =============================================================================

#[tokio::test]
async fn test_history_and_delete() {
    let (state, _) = make_state();
    let app = create_router(state);

    let resp = app.clone().oneshot(teacher_turn(None, "hello")).await.unwrap();
    let id = body_json(resp).await["conversationId"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(authed_get(&format!("/chat/{}/history", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let history: HistoryResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(history.conversation_id.to_string(), id);
    assert_eq!(history.messages.len(), 2);

    let resp = app
        .clone()
        .oneshot(authed_delete(&format!("/chat/{}", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(authed_get(&format!("/chat/{}/history", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.oneshot(authed_delete(&format!("/chat/{}", id))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_bad_id() {
    let (app, _) = make_app();
    let resp = app.oneshot(authed_get("/chat/not-a-uuid/history")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_request");
}
