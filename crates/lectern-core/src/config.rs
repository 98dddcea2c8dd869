use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LecternError, Result};

/// Top-level configuration for the Lectern assistant.
///
/// Loaded from `~/.lectern/config.toml` by default. Each section corresponds
/// to one subsystem; every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LecternConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl LecternConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LecternConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LecternError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make the dialogue loop misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.chat.max_message_length == 0 {
            return Err(LecternError::Config(
                "chat.max_message_length must be greater than zero".to_string(),
            ));
        }
        if self.chat.session_ttl_hours == 0 {
            return Err(LecternError::Config(
                "chat.session_ttl_hours must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.chat.min_model_confidence) {
            return Err(LecternError::Config(format!(
                "chat.min_model_confidence must be within [0, 1], got {}",
                self.chat.min_model_confidence
            )));
        }
        if self.llm.timeout_secs == 0 || self.backend.timeout_secs == 0 {
            return Err(LecternError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite history database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.lectern/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Dialogue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of prior messages sent to the model as history.
    pub history_turns: usize,
    /// Inactivity window after which a conversation is evicted.
    pub session_ttl_hours: u64,
    /// How often the background sweep runs.
    pub eviction_interval_secs: u64,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Mirror every message into the durable history database.
    pub persist_history: bool,
    /// Model results below this confidence yield to a pattern match.
    pub min_model_confidence: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: 6,
            session_ttl_hours: 24,
            eviction_interval_secs: 600,
            max_message_length: 4000,
            persist_history: true,
            min_model_confidence: 0.6,
        }
    }
}

/// Model-backed classification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// When false the classifier runs in offline (pattern-only) mode.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 10,
            temperature: 0.1,
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Name of the environment variable holding the shared key a trusted
    /// gateway presents in `X-Gateway-Key` alongside the caller's identity.
    /// Without it every caller is treated as a student.
    pub gateway_key_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            gateway_key_env: "LECTERN_GATEWAY_KEY".to_string(),
        }
    }
}

/// Course, calendar, and mail collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub classroom_base_url: String,
    pub calendar_base_url: String,
    pub mail_base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            classroom_base_url: "https://classroom.googleapis.com/v1".to_string(),
            calendar_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            mail_base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            timeout_secs: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = LecternConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.port, 3040);
        assert_eq!(config.chat.history_turns, 6);
        assert_eq!(config.chat.session_ttl_hours, 24);
        assert!(config.chat.persist_history);
        assert!(config.llm.enabled);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.backend.timeout_secs, 15);
        assert_eq!(config.api.gateway_key_env, "LECTERN_GATEWAY_KEY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[general]
port = 8080
log_level = "debug"

[chat]
history_turns = 10
session_ttl_hours = 48

[llm]
enabled = false
model = "local-model"

[api]
gateway_key_env = "CAMPUS_GATEWAY_KEY"
"#,
        );
        let config = LecternConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.chat.history_turns, 10);
        assert_eq!(config.chat.session_ttl_hours, 48);
        assert!(!config.llm.enabled);
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.api.gateway_key_env, "CAMPUS_GATEWAY_KEY");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nport = 9000\n");
        let config = LecternConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 9000);
        assert_eq!(config.general.data_dir, "~/.lectern/data");
        assert_eq!(config.chat.max_message_length, 4000);
        assert_eq!(config.backend.timeout_secs, 15);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = LecternConfig::load_or_default(Path::new("/does/not/exist/config.toml"));
        assert_eq!(config.general.port, 3040);
        assert_eq!(config.chat.session_ttl_hours, 24);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is [not valid");
        let result = LecternConfig::load(file.path());
        assert!(matches!(result, Err(LecternError::Config(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = create_temp_config("[chat]\nmin_model_confidence = 1.5\n");
        let result = LecternConfig::load(file.path());
        assert!(matches!(result, Err(LecternError::Config(_))));
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = LecternConfig::default();
        config.chat.session_ttl_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = LecternConfig::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = LecternConfig::default();
        config.general.port = 4444;
        config.llm.enabled = false;
        config.save(&path).unwrap();

        let reloaded = LecternConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.port, 4444);
        assert!(!reloaded.llm.enabled);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = LecternConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 3040);
        assert_eq!(config.chat.eviction_interval_secs, 600);
    }
}
