//! Channels
//!
//! Chat platform integration: the transport traits and the message types that
//! cross them.

pub mod mattermost;
#[path = "trait.rs"]
mod traits;

pub use mattermost::{MattermostChannel, MattermostConfig};
pub use traits::{ChannelError, ChannelResult, ChatTransport, Connection, MessageHandler};

/// Incoming message from a channel
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Unique message ID (platform-specific)
    pub id: String,
    /// Chat/room ID
    pub chat_id: String,
    /// Sender ID
    pub sender_id: String,
    /// Message text
    pub text: String,
    /// Root of the thread this message belongs to, if any
    pub root_id: Option<String>,
}

impl IncomingMessage {
    /// ID to attach a threaded reply to
    pub fn thread_root(&self) -> &str {
        self.root_id
            .as_deref()
            .filter(|root| !root.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Outgoing message to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Chat/room ID
    pub chat_id: String,
    /// Message text
    pub text: String,
    /// Thread to reply in; `None` posts top-level
    pub reply_to: Option<String>,
}

/// Event received on a live connection
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A new message was posted
    Posted(IncomingMessage),
    /// Anything else (typing, status replies, reactions, ...)
    Other { kind: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(root_id: Option<&str>) -> IncomingMessage {
        IncomingMessage {
            id: "post1".to_string(),
            chat_id: "chan1".to_string(),
            sender_id: "u1".to_string(),
            text: "/vote help".to_string(),
            root_id: root_id.map(str::to_string),
        }
    }

    #[test]
    fn test_thread_root_defaults_to_message_id() {
        assert_eq!(message(None).thread_root(), "post1");
        assert_eq!(message(Some("")).thread_root(), "post1");
    }

    #[test]
    fn test_thread_root_follows_existing_thread() {
        assert_eq!(message(Some("root9")).thread_root(), "root9");
    }
}
