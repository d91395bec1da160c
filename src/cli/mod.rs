//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- connect to Mattermost and serve poll commands
//! - `config show|path` -- inspect configuration
//! - `version` -- print build/version info

use clap::{Parser, Subcommand};

/// Poll bot for Mattermost channels.
#[derive(Parser, Debug)]
#[command(
    name = "votebot",
    version = env!("CARGO_PKG_VERSION"),
    about = "votebot: run polls in Mattermost channels with /vote commands"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the bot (default when no subcommand is given).
    Start,

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets redacted) as JSON.
    Show,

    /// Print the resolved configuration file path.
    Path,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

use crate::config::{self, BotConfig};
use serde_json::Value;

/// Secrets that should be redacted when printing config.
const SECRET_KEYS: &[&str] = &["token", "secret", "password"];

/// Run the `config show` subcommand.
pub fn handle_config_show() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config()?;
    let pretty = serde_json::to_string_pretty(&redacted_config(&cfg)?)?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path() {
    println!("{}", config::get_config_path().display());
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("votebot {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("VOTEBOT_BUILD_DATE"));
    println!("  Git commit: {}", env!("VOTEBOT_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Configuration as JSON with secrets redacted, for printing and logging.
pub fn redacted_config(cfg: &BotConfig) -> Result<Value, serde_json::Error> {
    Ok(redact_secrets(serde_json::to_value(cfg)?))
}

/// Redact known secret keys in a JSON value (recursive).
fn redact_secrets(mut value: Value) -> Value {
    match &mut value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let lower = key.to_lowercase();
                if SECRET_KEYS.iter().any(|s| lower.contains(s)) {
                    map.insert(key, Value::String("[REDACTED]".to_string()));
                } else if let Some(child) = map.remove(&key) {
                    map.insert(key, redact_secrets(child));
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                *item = redact_secrets(item.take());
            }
        }
        _ => {}
    }
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_args_defaults_to_none() {
        let cli = Cli::try_parse_from(["votebot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_start_subcommand() {
        let cli = Cli::try_parse_from(["votebot", "start"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Start)));
    }

    #[test]
    fn test_cli_version_subcommand() {
        let cli = Cli::try_parse_from(["votebot", "version"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Version)));
    }

    #[test]
    fn test_cli_config_show() {
        let cli = Cli::try_parse_from(["votebot", "config", "show"]).unwrap();
        match cli.command {
            Some(Command::Config(ConfigCommand::Show)) => {}
            other => panic!("Expected Config(Show), got {:?}", other),
        }
    }

    #[test]
    fn test_cli_config_path() {
        let cli = Cli::try_parse_from(["votebot", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::Path))
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["votebot", "status"]).is_err());
        assert!(Cli::try_parse_from(["votebot", "config", "set", "a", "b"]).is_err());
    }

    #[test]
    fn test_redacted_config_hides_access_token() {
        let mut cfg = BotConfig::default();
        cfg.mattermost.server_url = "https://chat.example.com".to_string();
        cfg.mattermost.access_token = "very-secret".to_string();

        let redacted = redacted_config(&cfg).unwrap();
        assert_eq!(redacted["mattermost"]["accessToken"], "[REDACTED]");
        assert_eq!(redacted["mattermost"]["serverUrl"], "https://chat.example.com");
        assert_eq!(redacted["ingest"]["maxInFlight"], 64);
        assert!(!redacted.to_string().contains("very-secret"));
    }

    #[test]
    fn test_redact_secrets_array() {
        let val = serde_json::json!([{"password": "secret"}, {"safe": "ok"}]);
        let redacted = redact_secrets(val);
        assert_eq!(redacted[0]["password"], "[REDACTED]");
        assert_eq!(redacted[1]["safe"], "ok");
    }
}
