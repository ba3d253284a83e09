//! Coach Controller - coaching sessions and weekly quotas for couples

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::orchestrator::{CoachError, OrchestratorSettings, SessionOrchestrator};
pub use crate::services::llm_bridge_client::LlmBridgeClient;
pub use crate::storage::db::init_db;
