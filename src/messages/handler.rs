//! Poll message handler.
//!
//! Runs one inbound chat message through parse -> engine -> reply and posts
//! the reply. Every engine failure ends here as a single reply.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::channels::{
    ChannelError, ChatTransport, IncomingMessage, MessageHandler, OutgoingMessage,
};
use crate::polls::reply::{self, Operation, Reply};
use crate::polls::{parse_command, PollCommand, PollEngine, PollError};

/// Handles `/vote` commands posted in any channel the bot can read
pub struct PollMessageHandler {
    engine: Arc<PollEngine>,
    transport: Arc<dyn ChatTransport>,
}

impl PollMessageHandler {
    pub fn new(engine: Arc<PollEngine>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { engine, transport }
    }

    /// Reply for a message, or `None` when the message is not a poll command
    pub async fn respond(&self, message: &IncomingMessage) -> Option<Reply> {
        let command = match parse_command(&message.text) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => {
                debug!(message_id = %message.id, error = %e, "Malformed poll command");
                return Some(reply::malformed(&e));
            }
        };

        debug!(
            message_id = %message.id,
            sender = %message.sender_id,
            command = command.name(),
            "Handling poll command"
        );

        let sender = message.sender_id.as_str();
        let reply = match command {
            PollCommand::Create { question, options } => {
                match self.engine.create_poll(&question, options, sender).await {
                    Ok(poll) => reply::poll_created(&poll),
                    Err(e) => failure(Operation::Create, &e),
                }
            }
            PollCommand::Vote { poll_id, position } => {
                match self.engine.cast_vote(&poll_id, sender, position).await {
                    Ok(receipt) => reply::vote_counted(&receipt),
                    Err(e) => failure(Operation::Vote, &e),
                }
            }
            PollCommand::Result { poll_id } => match self.engine.get_results(&poll_id).await {
                Ok(results) => reply::poll_results(&results),
                Err(e) => failure(Operation::Result, &e),
            },
            PollCommand::Close { poll_id } => {
                match self.engine.close_poll(&poll_id, sender).await {
                    Ok(poll) => reply::poll_closed(&poll),
                    Err(e) => failure(Operation::Close, &e),
                }
            }
            PollCommand::Delete { poll_id } => {
                match self.engine.delete_poll(&poll_id, sender).await {
                    Ok(()) => reply::poll_deleted(),
                    Err(e) => failure(Operation::Delete, &e),
                }
            }
            PollCommand::Help => reply::help(),
        };

        Some(reply)
    }
}

fn failure(op: Operation, err: &PollError) -> Reply {
    match err {
        PollError::StorageUnavailable(cause) => {
            error!(operation = ?op, error = %cause, "Poll command failed on storage");
        }
        other => debug!(operation = ?op, error = %other, "Poll command rejected"),
    }
    reply::engine_error(op, err)
}

#[async_trait]
impl MessageHandler for PollMessageHandler {
    async fn handle_message(&self, message: IncomingMessage) {
        let Some(reply) = self.respond(&message).await else {
            return;
        };

        let outgoing = OutgoingMessage {
            chat_id: message.chat_id.clone(),
            text: reply.text,
            reply_to: reply
                .threaded
                .then(|| message.thread_root().to_string()),
        };

        if let Err(e) = self.transport.send_message(outgoing).await {
            error!(
                message_id = %message.id,
                chat_id = %message.chat_id,
                error = %e,
                "Failed to send reply"
            );
        }
    }

    async fn handle_error(&self, error: ChannelError) {
        warn!(error = %error, "Receive error on live connection");
    }
}
