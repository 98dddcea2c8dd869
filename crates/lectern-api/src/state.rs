//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use lectern_chat::ChatOrchestrator;
use lectern_core::config::LecternConfig;

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatOrchestrator>,
    pub config: Arc<LecternConfig>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
    /// Shared key of the trusted gateway that vouches for caller identity.
    pub gateway_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(chat: Arc<ChatOrchestrator>, config: LecternConfig) -> Self {
        Self {
            chat,
            config: Arc::new(config),
            start_time: Instant::now(),
            gateway_key: None,
        }
    }

    /// Accept identity headers from a gateway presenting this key.
    pub fn with_gateway_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.gateway_key = (!key.trim().is_empty()).then(|| Arc::from(key.trim()));
        self
    }
}
