//! Typed configuration structures
//!
//! Provides strongly-typed access to configuration values with validation
//! and default values.

use super::ConfigError;
use crate::channels::MattermostConfig;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Mattermost connection settings
    #[serde(default)]
    pub mattermost: MattermostConfig,

    /// Poll storage settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Event ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BotConfig {
    /// Check everything the bot needs before it connects anywhere
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mm = &self.mattermost;
        if mm.server_url.is_empty() {
            return Err(invalid("mattermost.serverUrl is required (or set MM_SERVER)"));
        }
        match url::Url::parse(&mm.server_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(invalid(format!(
                    "mattermost.serverUrl must be http or https, got {}",
                    url.scheme()
                )))
            }
            Err(e) => {
                return Err(invalid(format!("mattermost.serverUrl is not a valid URL: {}", e)))
            }
        }
        if mm.access_token.is_empty() {
            return Err(invalid("mattermost.accessToken is required (or set MM_TOKEN)"));
        }
        if mm.team_name.is_empty() {
            return Err(invalid("mattermost.teamName is required (or set MM_TEAM)"));
        }

        if self.store.backend == StoreBackend::Sqlite && self.store.url.is_empty() {
            return Err(invalid("store.url is required for the sqlite backend"));
        }
        if self.store.max_connections == 0 {
            return Err(invalid("store.maxConnections must be at least 1"));
        }
        if self.store.timeout_ms == 0 {
            return Err(invalid("store.timeoutMs must be at least 1"));
        }
        if self.ingest.max_in_flight == 0 {
            return Err(invalid("ingest.maxInFlight must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart
    Memory,
    /// SQLite database via sqlx
    #[default]
    Sqlite,
}

/// Poll storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database URL, e.g. `sqlite://votebot.db`
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Per-call store timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            max_connections: default_max_connections(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_store_url() -> String {
    "sqlite://votebot.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Event ingestion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestConfig {
    /// Upper bound on the reconnect backoff
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Maximum number of messages handled concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl IngestConfig {
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_backoff_secs: default_max_backoff_secs(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_max_in_flight() -> usize {
    64
}
