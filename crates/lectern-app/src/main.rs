//! Lectern application binary - composition root.
//!
//! 1. Load configuration from TOML and apply command-line overrides
//! 2. Build the backend client and the classifier chain
//! 3. Open the durable history database
//! 4. Start the conversation eviction sweep
//! 5. Start the axum REST API server

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use lectern_action::{ActionOrchestrator, HttpBackend};
use lectern_api::state::AppState;
use lectern_chat::{
    spawn_eviction_task, ChatOrchestrator, ClassifierChain, ConversationStore, HttpLlmClient,
    InMemoryConversationStore, LlmClient, SqliteHistoryStore,
};
use lectern_core::config::LecternConfig;

use crate::cli::{expand_home, CliArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config_exists = config_file.exists();
    let mut config = LecternConfig::load_or_default(&config_file);
    args.apply(&mut config);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Lectern v{}", env!("CARGO_PKG_VERSION"));
    if config_exists {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
    }
    config.validate()?;

    // Backend.
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    tracing::info!(classroom = %config.backend.classroom_base_url, "Backend client ready");

    // Classifier.
    let llm: Option<Arc<dyn LlmClient>> = match HttpLlmClient::from_config(&config.llm)? {
        Some(client) => {
            tracing::info!(model = %config.llm.model, "Model classifier enabled");
            Some(Arc::new(client) as Arc<dyn LlmClient>)
        }
        None if config.llm.enabled => {
            tracing::warn!(
                env = %config.llm.api_key_env,
                "No API key found, classifying with patterns only"
            );
            None
        }
        None => {
            tracing::info!("Offline mode, classifying with patterns only");
            None
        }
    };
    let classifier = ClassifierChain::new(llm, &config.chat, &config.llm);

    // Conversations.
    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    let mut chat = ChatOrchestrator::new(
        Arc::clone(&store),
        classifier,
        ActionOrchestrator::with_defaults(backend),
        config.chat.clone(),
    );

    if config.chat.persist_history {
        let db_path = expand_home(&config.general.data_dir).join("history.db");
        let history = SqliteHistoryStore::new(&db_path)?;
        chat = chat.with_history(Arc::new(history));
    } else {
        tracing::info!("History persistence disabled");
    }
    let chat = Arc::new(chat);

    // === Background tasks ===

    // Ten years is effectively "never".
    let ttl_hours = config.chat.session_ttl_hours.min(87_600) as i64;
    spawn_eviction_task(
        store,
        Arc::clone(chat.locks()),
        chrono::Duration::hours(ttl_hours),
        Duration::from_secs(config.chat.eviction_interval_secs.max(1)),
    );

    // === API server ===

    let mut state = AppState::new(chat, config.clone());
    match std::env::var(&config.api.gateway_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::info!(env = %config.api.gateway_key_env, "Gateway identity headers enabled");
            state = state.with_gateway_key(key);
        }
        _ => tracing::info!("No gateway key, every caller is treated as a student"),
    }
    lectern_api::start_server(state).await?;

    Ok(())
}
