//! Polling Module
//!
//! Single-question polls driven by `/vote` chat commands.

pub mod command;
pub mod config;
pub mod engine;
pub mod reply;
pub mod store;

pub use command::{parse_command, CommandError, PollCommand, HELP_TEXT};
pub use config::{OptionTally, Poll, PollResults};
pub use engine::{PollEngine, PollError, VoteReceipt};
pub use reply::Reply;
pub use store::{MemoryPollStore, PollStore, SqlitePollStore, StoreError};
