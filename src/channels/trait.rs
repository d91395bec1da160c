//! Channel Traits
//!
//! Defines the seams between the chat platform and the poll pipeline.

use super::{ChannelEvent, IncomingMessage, OutgoingMessage};
use async_trait::async_trait;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur in channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Message handler for incoming messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message
    async fn handle_message(&self, message: IncomingMessage);

    /// Handle a receive error on the live connection
    async fn handle_error(&self, error: ChannelError);
}

/// A chat platform the bot can connect to and post on
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a live event connection
    async fn connect(&self) -> ChannelResult<Box<dyn Connection>>;

    /// Post a message, returning the platform's message ID
    async fn send_message(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// The bot's own user ID, once known
    fn self_user_id(&self) -> Option<String>;
}

/// A live event connection
#[async_trait]
pub trait Connection: Send {
    /// Next event from the platform; `None` once the connection is closed
    async fn next_event(&mut self) -> Option<ChannelResult<ChannelEvent>>;

    /// Close the connection gracefully
    async fn close(&mut self) -> ChannelResult<()>;
}
