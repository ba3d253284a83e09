use serde::Deserialize;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::orchestrator::{
    CONCERN_WINDOW_DAYS, HISTORY_WINDOW, RESUME_WINDOW_HOURS, WEEKLY_MESSAGE_LIMIT,
};

/// Main configuration for the coach controller
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// Maximum database connections
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,

    /// LLM provider credential. Without it the coach answers 503.
    #[validate(length(min = 20))]
    pub llm_api_key: Option<String>,

    pub llm_base_url: String,

    pub llm_model: String,

    #[validate(range(min = 1, max = 8192))]
    pub llm_max_tokens: u32,

    /// Upper bound on a single completion call
    #[validate(range(min = 1, max = 300))]
    pub llm_timeout_secs: u64,

    /// Free-tier messages per ISO week
    #[validate(range(min = 1))]
    pub weekly_message_limit: u32,

    /// Conversations idle longer than this are not resumed
    #[validate(range(min = 1))]
    pub resume_window_hours: i64,

    /// Most recent messages passed to the LLM
    #[validate(range(min = 1, max = 200))]
    pub history_window: u64,

    /// Lookback for check-in pattern analysis
    #[validate(range(min = 1, max = 90))]
    pub concern_window_days: i64,

    /// REST rate limit in requests per minute, per client IP
    #[validate(range(min = 1))]
    pub rest_rate_limit_per_minute: u32,

    pub cors_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            database_url: "sqlite://coach.db".to_string(),
            max_connections: 10,
            log_level: "info".to_string(),
            llm_api_key: None,
            llm_base_url: "https://api.anthropic.com".to_string(),
            llm_model: "claude-sonnet-4-20250514".to_string(),
            llm_max_tokens: 1024,
            llm_timeout_secs: 30,
            weekly_message_limit: WEEKLY_MESSAGE_LIMIT,
            resume_window_hours: RESUME_WINDOW_HOURS,
            history_window: HISTORY_WINDOW,
            concern_window_days: CONCERN_WINDOW_DAYS,
            rest_rate_limit_per_minute: 120,
            cors_enabled: true,
        }
    }
}

impl Config {
    /// Defaults, then `~/.coach/config.toml`, then `COACH__*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".coach")
            .join("config");
        Self::load_from(&path, false)
    }

    pub fn load_from(path: &Path, required: bool) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();

        let settings = config::Config::builder()
            // Core defaults
            .set_default("server_port", i64::from(defaults.server_port))?
            .set_default("database_url", defaults.database_url)?
            .set_default("max_connections", defaults.max_connections)?
            .set_default("log_level", defaults.log_level)?
            .set_default("llm_base_url", defaults.llm_base_url)?
            .set_default("llm_model", defaults.llm_model)?
            .set_default("llm_max_tokens", defaults.llm_max_tokens)?
            .set_default("llm_timeout_secs", defaults.llm_timeout_secs)?
            // Coaching limits
            .set_default("weekly_message_limit", defaults.weekly_message_limit)?
            .set_default("resume_window_hours", defaults.resume_window_hours)?
            .set_default("history_window", defaults.history_window)?
            .set_default("concern_window_days", defaults.concern_window_days)?
            .set_default("rest_rate_limit_per_minute", defaults.rest_rate_limit_per_minute)?
            .set_default("cors_enabled", defaults.cors_enabled)?
            .add_source(config::File::from(path).required(required))
            // Environment overrides: COACH__SERVER_PORT, COACH__LLM_API_KEY, etc.
            .add_source(
                config::Environment::with_prefix("COACH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;

        if cfg.llm_api_key.is_none() {
            cfg.llm_api_key = std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    pub fn llm_configured(&self) -> bool {
        self.llm_api_key.is_some()
    }
}
