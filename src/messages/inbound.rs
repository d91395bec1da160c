//! Inbound event loop.
//!
//! Keeps one live connection to the chat platform, reconnecting with
//! exponential backoff, and hands each posted message to the handler on its
//! own task. Stops on the shutdown signal, closing the open connection first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, trace, warn};

use crate::channels::{ChannelEvent, ChatTransport, Connection, IncomingMessage, MessageHandler};
use crate::config::IngestConfig;

/// How long shutdown waits for in-flight handlers
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff after the `failures`-th consecutive failed connect: `min(2^failures s, max)`
pub fn reconnect_delay(failures: u32, max: Duration) -> Duration {
    let secs = 1u64.checked_shl(failures).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(max)
}

/// Why a live connection stopped being read
enum Stop {
    /// Connection ended; `live` if it delivered at least one event first
    Dropped { live: bool },
    Shutdown,
}

/// Ingestion loop over a chat transport
pub struct InboundLoop {
    transport: Arc<dyn ChatTransport>,
    handler: Arc<dyn MessageHandler>,
    config: IngestConfig,
    in_flight: Arc<Semaphore>,
}

impl InboundLoop {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        handler: Arc<dyn MessageHandler>,
        config: IngestConfig,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            transport,
            handler,
            config,
            in_flight,
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let connected = tokio::select! {
                result = self.transport.connect() => result,
                _ = shutdown.changed() => break,
            };

            let mut connection = match connected {
                Ok(connection) => connection,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(error = %e, failures, "Connection failed");
                    if !self.back_off(failures, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            match self.pump(connection.as_mut(), &mut shutdown).await {
                Stop::Dropped { live: true } => {
                    failures = 0;
                    info!("Connection lost, reconnecting");
                }
                // Accepted and then closed without a single event
                Stop::Dropped { live: false } => {
                    failures = failures.saturating_add(1);
                    warn!(failures, "Connection closed before any event");
                    if !self.back_off(failures, &mut shutdown).await {
                        break;
                    }
                }
                Stop::Shutdown => {
                    if let Err(e) = connection.close().await {
                        debug!(error = %e, "Error closing connection");
                    }
                    break;
                }
            }
        }

        self.drain().await;
        info!("Inbound loop stopped");
    }

    /// Sleep out the backoff for the `failures`-th failure. Returns `false`
    /// if shutdown was requested first.
    async fn back_off(&self, failures: u32, shutdown: &mut watch::Receiver<bool>) -> bool {
        let delay = reconnect_delay(failures, self.config.max_backoff());
        debug!(retry_in_secs = delay.as_secs(), "Waiting before reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown.changed() => false,
        }
    }

    /// Read events until the connection drops or shutdown is requested
    async fn pump(
        &self,
        connection: &mut dyn Connection,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Stop {
        let mut live = false;
        loop {
            let event = tokio::select! {
                event = connection.next_event() => event,
                _ = shutdown.changed() => return Stop::Shutdown,
            };

            match event {
                None => return Stop::Dropped { live },
                Some(Err(e)) => {
                    self.handler.handle_error(e).await;
                    return Stop::Dropped { live };
                }
                Some(Ok(event)) => {
                    live = true;
                    if !self.on_event(event, shutdown).await {
                        return Stop::Shutdown;
                    }
                }
            }
        }
    }

    /// Returns `false` if shutdown was requested while dispatching
    async fn on_event(&self, event: ChannelEvent, shutdown: &mut watch::Receiver<bool>) -> bool {
        match event {
            ChannelEvent::Other { kind } => {
                trace!(kind = %kind, "Ignoring event");
                true
            }
            ChannelEvent::Posted(message) if self.is_own(&message) => true,
            ChannelEvent::Posted(message) => self.dispatch(message, shutdown).await,
        }
    }

    fn is_own(&self, message: &IncomingMessage) -> bool {
        self.transport
            .self_user_id()
            .is_some_and(|me| me == message.sender_id)
    }

    /// Spawn the handler once an in-flight slot is free. Returns `false` if
    /// shutdown was requested while waiting.
    async fn dispatch(
        &self,
        message: IncomingMessage,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let permit = tokio::select! {
            permit = self.in_flight.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
            _ = shutdown.changed() => return false,
        };

        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.handle_message(message).await;
            drop(permit);
        });
        true
    }

    /// Wait for spawned handlers to finish, up to [`DRAIN_TIMEOUT`]
    async fn drain(&self) {
        let Ok(slots) = u32::try_from(self.config.max_in_flight.max(1)) else {
            return;
        };
        match tokio::time::timeout(DRAIN_TIMEOUT, self.in_flight.acquire_many(slots)).await {
            Ok(_) => {}
            Err(_) => warn!(
                in_flight = slots as usize - self.in_flight.available_permits(),
                "Shutting down with handlers still running"
            ),
        }
    }
}
