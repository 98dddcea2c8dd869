//! In-memory [`BackendService`] for tests and offline demos.
//!
//! Entities live in collections keyed by their REST path. Every call is
//! counted per operation and kind, and failures can be queued for the next
//! matching call. Posting coursework or announcements to a course that is
//! not `ACTIVE` fails with a precondition error, like the real service.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use lectern_core::types::AuthToken;
use serde_json::{json, Value};
use tracing::debug;

use super::{BackendError, BackendOp, BackendService};
use crate::types::{Entity, EntityKind};

struct InjectedFailure {
    op: BackendOp,
    kind: Option<&'static str>,
    error: BackendError,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Value>>,
    calls: HashMap<(BackendOp, &'static str), usize>,
    failures: VecDeque<InjectedFailure>,
    next_id: u64,
}

impl MemoryState {
    fn mint_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn record(&mut self, op: BackendOp, kind: &EntityKind) -> Result<(), BackendError> {
        *self.calls.entry((op, kind.name())).or_insert(0) += 1;
        let position = self
            .failures
            .iter()
            .position(|f| f.op == op && f.kind.map_or(true, |k| k == kind.name()));
        match position.and_then(|i| self.failures.remove(i)) {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }

    fn insert(&mut self, kind: &EntityKind, mut raw: Value) -> Entity {
        let id_field = id_field(kind);
        if raw.get(id_field).is_none() {
            let id = self.mint_id();
            if let Some(obj) = raw.as_object_mut() {
                obj.insert(id_field.to_string(), Value::String(id));
            }
        }
        if let (EntityKind::Course, Some(obj)) = (kind, raw.as_object_mut()) {
            obj.entry("courseState")
                .or_insert_with(|| Value::String("ACTIVE".to_string()));
        }
        self.collections
            .entry(kind.path())
            .or_default()
            .push(raw.clone());
        Entity::from_json(kind, raw)
    }

    fn find_mut(&mut self, kind: &EntityKind, id: &str) -> Option<&mut Value> {
        self.collections
            .get_mut(&kind.path())?
            .iter_mut()
            .find(|raw| matches_id(kind, raw, id))
    }

    fn course_state(&self, course_id: &str) -> Option<String> {
        self.collections
            .get(&EntityKind::Course.path())?
            .iter()
            .find(|raw| matches_id(&EntityKind::Course, raw, course_id))
            .and_then(|raw| raw.get("courseState"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

fn id_field(kind: &EntityKind) -> &'static str {
    match kind {
        EntityKind::Student { .. } | EntityKind::Teacher { .. } => "userId",
        _ => "id",
    }
}

fn matches_id(kind: &EntityKind, raw: &Value, id: &str) -> bool {
    let own = raw.get(id_field(kind)).and_then(Value::as_str) == Some(id);
    let by_email = raw
        .pointer("/profile/emailAddress")
        .and_then(Value::as_str)
        .is_some_and(|email| email.eq_ignore_ascii_case(id));
    own || by_email
}

fn not_found() -> BackendError {
    BackendError::http(404, "Requested entity was not found.")
}

/// Thread-safe in-memory backend.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, BackendError> {
        self.state
            .lock()
            .map_err(|e| BackendError::Transport(format!("Lock poisoned: {}", e)))
    }

    // ---- Seeding (not counted as calls) ----

    /// Insert a record directly; an id is minted when absent.
    pub fn seed(&self, kind: &EntityKind, raw: Value) -> Entity {
        match self.state() {
            Ok(mut state) => state.insert(kind, raw),
            Err(_) => Entity::from_json(kind, raw),
        }
    }

    pub fn seed_course(&self, name: &str, state: &str) -> Entity {
        self.seed(
            &EntityKind::Course,
            json!({"name": name, "courseState": state}),
        )
    }

    pub fn seed_student(&self, course_id: &str, email: &str, full_name: &str) -> Entity {
        self.seed(
            &EntityKind::Student {
                course_id: course_id.to_string(),
            },
            json!({
                "courseId": course_id,
                "profile": {"name": {"fullName": full_name}, "emailAddress": email}
            }),
        )
    }

    // ---- Failure injection ----

    /// Fail the next `op` call (optionally only for one kind) with `error`.
    pub fn fail_next(&self, op: BackendOp, kind: Option<&'static str>, error: BackendError) {
        if let Ok(mut state) = self.state() {
            state.failures.push_back(InjectedFailure { op, kind, error });
        }
    }

    // ---- Inspection ----

    /// Number of `op` calls across all kinds.
    pub fn calls(&self, op: BackendOp) -> usize {
        match self.state() {
            Ok(state) => state
                .calls
                .iter()
                .filter(|((o, _), _)| *o == op)
                .map(|(_, n)| n)
                .sum(),
            Err(_) => 0,
        }
    }

    /// Number of `op` calls against one kind (e.g. `"course"`).
    pub fn calls_for(&self, op: BackendOp, kind: &str) -> usize {
        match self.state() {
            Ok(state) => state
                .calls
                .iter()
                .filter(|((o, k), _)| *o == op && *k == kind)
                .map(|(_, n)| *n)
                .sum(),
            Err(_) => 0,
        }
    }

    pub fn total_calls(&self) -> usize {
        match self.state() {
            Ok(state) => state.calls.values().sum(),
            Err(_) => 0,
        }
    }

    /// Current contents of a collection, without counting a call.
    pub fn entities(&self, kind: &EntityKind) -> Vec<Entity> {
        match self.state() {
            Ok(state) => state
                .collections
                .get(&kind.path())
                .map(|items| {
                    items
                        .iter()
                        .cloned()
                        .map(|raw| Entity::from_json(kind, raw))
                        .collect()
                })
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl BackendService for InMemoryBackend {
    async fn list(&self, _token: &AuthToken, kind: &EntityKind) -> Result<Vec<Entity>, BackendError> {
        let mut state = self.state()?;
        state.record(BackendOp::List, kind)?;
        let items = state
            .collections
            .get(&kind.path())
            .cloned()
            .unwrap_or_default();
        let entities: Vec<Entity> = items
            .into_iter()
            .filter(|raw| match kind {
                EntityKind::Invitation {
                    course_id: Some(id),
                } => raw.get("courseId").and_then(Value::as_str) == Some(id.as_str()),
                _ => true,
            })
            .map(|raw| Entity::from_json(kind, raw))
            .collect();
        debug!(kind = %kind, count = entities.len(), "In-memory list");
        Ok(entities)
    }

    async fn get(&self, _token: &AuthToken, kind: &EntityKind, id: &str) -> Result<Entity, BackendError> {
        let mut state = self.state()?;
        state.record(BackendOp::Get, kind)?;
        state
            .find_mut(kind, id)
            .map(|raw| Entity::from_json(kind, raw.clone()))
            .ok_or_else(not_found)
    }

    async fn create(&self, _token: &AuthToken, kind: &EntityKind, body: Value) -> Result<Entity, BackendError> {
        let mut state = self.state()?;
        state.record(BackendOp::Create, kind)?;

        if let EntityKind::Assignment { course_id } | EntityKind::Announcement { course_id } = kind {
            match state.course_state(course_id) {
                None => return Err(not_found()),
                Some(s) if s != "ACTIVE" => {
                    return Err(BackendError::http(400, "Precondition check failed."));
                }
                Some(_) => {}
            }
        }
        if !body.is_object() {
            return Err(BackendError::http(400, "Request body must be an object."));
        }
        Ok(state.insert(kind, body))
    }

    async fn update(
        &self,
        _token: &AuthToken,
        kind: &EntityKind,
        id: &str,
        body: Value,
    ) -> Result<Entity, BackendError> {
        let mut state = self.state()?;
        state.record(BackendOp::Update, kind)?;
        let field = id_field(kind);
        let raw = state.find_mut(kind, id).ok_or_else(not_found)?;
        let keep_id = raw.get(field).cloned();
        *raw = body;
        if let (Some(id_value), Some(obj)) = (keep_id, raw.as_object_mut()) {
            obj.insert(field.to_string(), id_value);
        }
        Ok(Entity::from_json(kind, raw.clone()))
    }

    async fn patch(
        &self,
        _token: &AuthToken,
        kind: &EntityKind,
        id: &str,
        body: Value,
    ) -> Result<Entity, BackendError> {
        let mut state = self.state()?;
        state.record(BackendOp::Patch, kind)?;
        let raw = state.find_mut(kind, id).ok_or_else(not_found)?;
        if let (Some(target), Some(changes)) = (raw.as_object_mut(), body.as_object()) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(Entity::from_json(kind, raw.clone()))
    }

    async fn delete(&self, _token: &AuthToken, kind: &EntityKind, id: &str) -> Result<(), BackendError> {
        let mut state = self.state()?;
        state.record(BackendOp::Delete, kind)?;
        let items = state
            .collections
            .get_mut(&kind.path())
            .ok_or_else(not_found)?;
        let before = items.len();
        items.retain(|raw| !matches_id(kind, raw, id));
        if items.len() == before {
            return Err(not_found());
        }
        Ok(())
    }
}
