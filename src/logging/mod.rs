//! Logging
//!
//! Structured logging setup and redaction of secrets from logged text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Logging error types
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `votebot=debug,sqlx=warn`
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable text
    #[default]
    Text,
}

/// Install the global subscriber
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?,
    };

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };
    result.map_err(|e| LoggingError::InitError(e.to_string()))?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // Bearer tokens in Authorization headers
        (
            Regex::new(r"(?i)(authorization:\s*bearer\s+)[a-zA-Z0-9_\-.]+").unwrap(),
            "${1}***REDACTED***",
        ),
        // Basic auth in URLs
        (
            Regex::new(r"(\w+://[^:/@\s]+:)[^:/@\s]+(@)").unwrap(),
            "${1}***REDACTED***${2}",
        ),
        // Tokens in query params
        (
            Regex::new(r"(?i)([?&](access_?token|token|secret|password)=)[^&\s]+").unwrap(),
            "${1}***REDACTED***",
        ),
        // JSON fields
        (
            Regex::new(
                r##"(?i)("(?:accessToken|access_token|token|secret|password)"\s*:\s*")[^"]+"##,
            )
            .unwrap(),
            "${1}***REDACTED***",
        ),
    ]
});

/// Redact secrets from text before it is logged
///
/// Covers bearer tokens, credentials embedded in URLs, token query
/// parameters and token fields of JSON bodies.
pub fn sanitize_log_message(message: &str) -> String {
    let mut result = message.to_string();
    for (pattern, replacement) in SECRET_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).into_owned();
    }
    result
}
