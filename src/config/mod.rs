//! Configuration
//!
//! Loads `votebot.json5` and layers environment overrides on top of it.

pub mod types;

pub use types::{BotConfig, IngestConfig, StoreBackend, StoreConfig};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "VOTEBOT_CONFIG_PATH";

const CONFIG_FILE_NAME: &str = "votebot.json5";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Resolved configuration file path
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("votebot")
        .join(CONFIG_FILE_NAME)
}

/// Load the effective configuration: file, then environment overrides
///
/// Does not validate; callers that are about to connect should call
/// [`BotConfig::validate`].
pub fn load_config() -> Result<BotConfig, ConfigError> {
    let mut cfg = load_config_from(&get_config_path())?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// Load a config file; a missing file yields the defaults
pub fn load_config_from(path: &Path) -> Result<BotConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(BotConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    json5::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Apply environment overrides
///
/// `lookup` returns the value of an environment variable, if set. Empty
/// values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut BotConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

    if let Some(server) = get("MM_SERVER") {
        cfg.mattermost.server_url = server;
    }
    if let Some(token) = get("MM_TOKEN") {
        cfg.mattermost.access_token = token;
    }
    if let Some(team) = get("MM_TEAM") {
        cfg.mattermost.team_name = team;
    }
    if let Some(username) = get("MM_USERNAME") {
        cfg.mattermost.username = Some(username);
    }
    if let Some(url) = get("VOTEBOT_STORE_URL") {
        cfg.store.url = url;
    }
    if let Some(level) = get("VOTEBOT_LOG_LEVEL") {
        cfg.logging.level = level;
    }
}
