pub mod config;
pub mod context;
pub mod error;
pub mod intent;
pub mod taxonomy;
pub mod types;

pub use config::LecternConfig;
pub use context::{Context, ContextPatch, EntityOption, OngoingAction, Patch, PendingAction};
pub use error::{LecternError, Result};
pub use intent::{Intent, IntentResult, IntentSource};
pub use taxonomy::{keys, spec_for, IntentSpec, ParamShape, RolePolicy, INTENT_TABLE};
pub use types::*;
