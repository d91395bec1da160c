use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use votebot::channels::MattermostChannel;
use votebot::cli::{self, Cli, Command, ConfigCommand};
use votebot::config::{self, StoreBackend, StoreConfig};
use votebot::logging::{self, sanitize_log_message};
use votebot::messages::{InboundLoop, PollMessageHandler};
use votebot::polls::{MemoryPollStore, PollEngine, PollStore, SqlitePollStore};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Start) {
        Command::Start => run_bot().await,
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(),
        Command::Config(ConfigCommand::Path) => {
            cli::handle_config_path();
            Ok(())
        }
        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Connect everything and serve until SIGINT/SIGTERM.
async fn run_bot() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config()?;
    logging::init_logging(&cfg.logging)?;
    cfg.validate()?;
    info!(config = %cli::redacted_config(&cfg)?, "Starting votebot");

    let store = open_store(&cfg.store).await?;
    let engine = Arc::new(PollEngine::new(store).with_store_timeout(cfg.store.timeout()));

    let channel = Arc::new(MattermostChannel::new(cfg.mattermost.clone())?);
    channel.login().await?;
    channel.find_team().await?;

    let handler = Arc::new(PollMessageHandler::new(engine, channel.clone()));
    let inbound = InboundLoop::new(channel, handler, cfg.ingest.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    inbound.run(shutdown_rx).await;
    info!("votebot stopped");
    Ok(())
}

async fn open_store(cfg: &StoreConfig) -> Result<Arc<dyn PollStore>, Box<dyn std::error::Error>> {
    match cfg.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory poll store, polls will not survive a restart");
            Ok(Arc::new(MemoryPollStore::new()))
        }
        StoreBackend::Sqlite => {
            info!(url = %sanitize_log_message(&cfg.url), "Opening poll database");
            let store = SqlitePollStore::connect(&cfg.url, cfg.max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C will stop the bot");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
