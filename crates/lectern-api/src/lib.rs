//! Lectern API crate - axum HTTP surface over the turn orchestrator.
//!
//! `POST /chat` runs one turn; conversation history can be read and
//! deleted; `/health` is public.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
