//! Message flow between the chat platform and the poll engine.

pub mod handler;
pub mod inbound;

pub use handler::PollMessageHandler;
pub use inbound::{reconnect_delay, InboundLoop};
