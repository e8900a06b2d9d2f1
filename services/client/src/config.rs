//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use java_tutor_core::domain::ThresholdConfig;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub backend_base_url: String,
    pub auth_token: Option<String>,
    pub log_level: Level,
    /// Engagement score at which the quiz gate fires.
    pub quiz_threshold: u32,
    /// Engagement score at which the practice gate arms.
    pub practice_threshold: u32,
    /// Master switch for automatic activity triggering.
    pub auto_trigger: bool,
    /// How often conversation/metadata are flushed to the backend.
    pub sync_interval: Duration,
    /// Settle time before a topic switch actually fetches lesson plans.
    pub topic_debounce: Duration,
    /// Minimum spacing between progress-broadcast-triggered reloads.
    pub progress_reload_throttle: Duration,
    /// Window during which a just-finished practice is not prompted again.
    pub practice_reprompt_guard: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let backend_base_url = std::env::var("TUTOR_BACKEND_URL")
            .map_err(|_| ConfigError::MissingVar("TUTOR_BACKEND_URL".to_string()))?;

        let auth_token = std::env::var("TUTOR_AUTH_TOKEN").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let quiz_threshold = parse_var("QUIZ_THRESHOLD", 30)?;
        let practice_threshold = parse_var("PRACTICE_THRESHOLD", 70)?;
        let auto_trigger = parse_var("AUTO_TRIGGER", true)?;

        let sync_interval = Duration::from_secs(parse_var("SYNC_INTERVAL_SECS", 30u64)?);
        let topic_debounce = Duration::from_millis(parse_var("TOPIC_DEBOUNCE_MS", 200u64)?);
        let progress_reload_throttle =
            Duration::from_millis(parse_var("PROGRESS_RELOAD_THROTTLE_MS", 1500u64)?);
        let practice_reprompt_guard =
            Duration::from_secs(parse_var("PRACTICE_GUARD_HOURS", 6u64)? * 3600);

        Ok(Self {
            backend_base_url,
            auth_token,
            log_level,
            quiz_threshold,
            practice_threshold,
            auto_trigger,
            sync_interval,
            topic_debounce,
            progress_reload_throttle,
            practice_reprompt_guard,
        })
    }

    /// The immutable threshold configuration handed to the sequencer at
    /// tracking start.
    pub fn thresholds(&self) -> ThresholdConfig {
        ThresholdConfig {
            quiz_threshold: self.quiz_threshold,
            practice_threshold: self.practice_threshold,
            auto_trigger: self.auto_trigger,
        }
    }
}

/// Parses an optional environment variable, falling back to `default`.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
