//! votebot library
//!
//! Single-question polls for Mattermost channels: the poll store and
//! engine, the `/vote` command parser, and the ingestion loop that feeds
//! them from a live Mattermost connection.

pub mod channels;
pub mod cli;
pub mod config;
pub mod logging;
pub mod messages;
pub mod polls;
