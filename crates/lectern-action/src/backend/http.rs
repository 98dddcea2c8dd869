//! REST implementation of [`BackendService`] over reqwest.
//!
//! Course, roster, coursework, announcement and invitation kinds go to the
//! classroom service; meetings to the calendar service; email to the mail
//! service. Errors keep the HTTP status and the service's own message.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE as BASE64_URL_SAFE;
use base64::Engine;
use lectern_core::config::BackendConfig;
use lectern_core::types::AuthToken;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;

use super::{BackendError, BackendService};
use crate::types::{Entity, EntityKind};

/// Upper bound on followed `nextPageToken`s for one list call.
const MAX_PAGES: usize = 10;

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    classroom_base: String,
    calendar_base: String,
    mail_base: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            classroom_base: trim_base(&config.classroom_base_url),
            calendar_base: trim_base(&config.calendar_base_url),
            mail_base: trim_base(&config.mail_base_url),
        })
    }

    fn base_for(&self, kind: &EntityKind) -> &str {
        match kind {
            EntityKind::Meeting => &self.calendar_base,
            EntityKind::Email => &self.mail_base,
            _ => &self.classroom_base,
        }
    }

    fn collection_url(&self, kind: &EntityKind) -> String {
        format!("{}/{}", self.base_for(kind), kind.path())
    }

    fn item_url(&self, kind: &EntityKind, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), id)
    }

    fn request(&self, method: Method, url: &str, token: &AuthToken) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(token.as_str())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, BackendError> {
        let response = builder.send().await.map_err(map_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport)?;

        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BackendService for HttpBackend {
    async fn list(&self, token: &AuthToken, kind: &EntityKind) -> Result<Vec<Entity>, BackendError> {
        let url = self.collection_url(kind);
        let mut entities = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, String)> = list_query(kind);
            if let Some(ref t) = page_token {
                query.push(("pageToken", t.clone()));
            }
            let body = self
                .send(self.request(Method::GET, &url, token).query(&query))
                .await?;

            if let Some(items) = body.get(kind.list_field()).and_then(Value::as_array) {
                entities.extend(items.iter().cloned().map(|raw| Entity::from_json(kind, raw)));
            }
            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        debug!(kind = %kind, count = entities.len(), "Listed entities");
        Ok(entities)
    }

    async fn get(&self, token: &AuthToken, kind: &EntityKind, id: &str) -> Result<Entity, BackendError> {
        let body = self
            .send(self.request(Method::GET, &self.item_url(kind, id), token))
            .await?;
        Ok(Entity::from_json(kind, body))
    }

    async fn create(&self, token: &AuthToken, kind: &EntityKind, body: Value) -> Result<Entity, BackendError> {
        let (url, payload) = match kind {
            EntityKind::Email => (
                format!("{}/send", self.collection_url(kind)),
                encode_email(&body),
            ),
            _ => (self.collection_url(kind), body),
        };
        let created = self
            .send(self.request(Method::POST, &url, token).json(&payload))
            .await?;
        Ok(Entity::from_json(kind, created))
    }

    async fn update(
        &self,
        token: &AuthToken,
        kind: &EntityKind,
        id: &str,
        body: Value,
    ) -> Result<Entity, BackendError> {
        let updated = self
            .send(self.request(Method::PUT, &self.item_url(kind, id), token).json(&body))
            .await?;
        Ok(Entity::from_json(kind, updated))
    }

    async fn patch(
        &self,
        token: &AuthToken,
        kind: &EntityKind,
        id: &str,
        body: Value,
    ) -> Result<Entity, BackendError> {
        let mut builder = self.request(Method::PATCH, &self.item_url(kind, id), token);
        if let Some(mask) = update_mask(kind, &body) {
            builder = builder.query(&[("updateMask", mask)]);
        }
        let patched = self.send(builder.json(&body)).await?;
        Ok(Entity::from_json(kind, patched))
    }

    async fn delete(&self, token: &AuthToken, kind: &EntityKind, id: &str) -> Result<(), BackendError> {
        self.send(self.request(Method::DELETE, &self.item_url(kind, id), token))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn map_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(err.to_string())
    }
}

fn list_query(kind: &EntityKind) -> Vec<(&'static str, String)> {
    match kind {
        EntityKind::Invitation {
            course_id: Some(id),
        } => vec![("courseId", id.clone())],
        EntityKind::Meeting => vec![
            ("timeMin", chrono::Utc::now().to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ],
        EntityKind::Email => vec![("maxResults", "10".to_string())],
        EntityKind::Course => vec![
            ("courseStates", "ACTIVE".to_string()),
            ("courseStates", "PROVISIONED".to_string()),
        ],
        _ => Vec::new(),
    }
}

/// Classroom partial updates need an explicit field mask.
fn update_mask(kind: &EntityKind, body: &Value) -> Option<String> {
    if matches!(kind, EntityKind::Meeting | EntityKind::Email) {
        return None;
    }
    let keys: Vec<&str> = body.as_object()?.keys().map(String::as_str).collect();
    (!keys.is_empty()).then(|| keys.join(","))
}

/// Pull `error.message` out of a Google-style error body, falling back to
/// the raw text.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(Value::as_str));
    let status = error.and_then(|e| e.get("status")).and_then(Value::as_str);

    match (message, status) {
        (Some(m), Some("FAILED_PRECONDITION")) if !m.to_lowercase().contains("precondition") => {
            format!("{} (FAILED_PRECONDITION)", m)
        }
        (Some(m), _) => m.to_string(),
        (None, _) => body.trim().to_string(),
    }
}

/// Build the `{raw}` payload the mail service expects from
/// `{to, subject, body}`.
pub(crate) fn encode_email(body: &Value) -> Value {
    let to = match body.get("to") {
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    let subject = body.get("subject").and_then(Value::as_str).unwrap_or("");
    let text = body.get("body").and_then(Value::as_str).unwrap_or("");
    let message = format!(
        "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\n{}",
        to, subject, text
    );
    json!({ "raw": BASE64_URL_SAFE.encode(message.as_bytes()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            classroom_base_url: "https://classroom.test/v1/".to_string(),
            calendar_base_url: "https://calendar.test/v3".to_string(),
            mail_base_url: "https://mail.test/v1".to_string(),
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[test]
    fn test_urls_route_by_kind() {
        let b = backend();
        assert_eq!(b.collection_url(&EntityKind::Course), "https://classroom.test/v1/courses");
        assert_eq!(
            b.item_url(&EntityKind::Course, "42"),
            "https://classroom.test/v1/courses/42"
        );
        assert_eq!(
            b.collection_url(&EntityKind::Meeting),
            "https://calendar.test/v3/calendars/primary/events"
        );
        assert_eq!(
            b.collection_url(&EntityKind::Email),
            "https://mail.test/v1/users/me/messages"
        );
    }

    #[test]
    fn test_error_message_google_shape() {
        let body = r#"{"error": {"code": 400, "message": "Precondition check failed.", "status": "FAILED_PRECONDITION"}}"#;
        assert_eq!(error_message(body), "Precondition check failed.");

        let body = r#"{"error": {"code": 400, "message": "Course is not active.", "status": "FAILED_PRECONDITION"}}"#;
        let msg = error_message(body);
        assert_eq!(msg, "Course is not active. (FAILED_PRECONDITION)");
        assert_eq!(
            BackendError::http(400, msg).class(),
            super::super::ErrorClass::Precondition
        );
    }

    #[test]
    fn test_error_message_plain_text() {
        assert_eq!(error_message("Service Unavailable\n"), "Service Unavailable");
        assert_eq!(error_message(r#"{"error": "invalid_token"}"#), "invalid_token");
    }

    #[test]
    fn test_update_mask() {
        let body = json!({"courseState": "ACTIVE"});
        assert_eq!(update_mask(&EntityKind::Course, &body), Some("courseState".to_string()));
        assert_eq!(update_mask(&EntityKind::Meeting, &body), None);
        assert_eq!(update_mask(&EntityKind::Course, &json!({})), None);
    }

    #[test]
    fn test_encode_email() {
        let payload = encode_email(&json!({
            "to": ["a@x.com", "b@x.com"],
            "subject": "Test moved",
            "body": "See you Friday."
        }));
        let raw = payload["raw"].as_str().unwrap();
        let decoded = String::from_utf8(BASE64_URL_SAFE.decode(raw).unwrap()).unwrap();
        assert!(decoded.starts_with("To: a@x.com, b@x.com\r\nSubject: Test moved\r\n"));
        assert!(decoded.ends_with("\r\n\r\nSee you Friday."));
    }

    #[test]
    fn test_list_query_for_invitations() {
        let q = list_query(&EntityKind::Invitation {
            course_id: Some("9".into()),
        });
        assert_eq!(q, vec![("courseId", "9".to_string())]);
        assert!(list_query(&EntityKind::Invitation { course_id: None }).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let b = HttpBackend::new(&BackendConfig {
            classroom_base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..BackendConfig::default()
        })
        .unwrap();
        let err = b
            .list(&AuthToken::new("t"), &EntityKind::Course)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(_) | BackendError::Timeout));
    }
}
