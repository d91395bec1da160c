//! Reply rendering
//!
//! Every command outcome becomes exactly one [`Reply`]. Announcements that
//! concern the whole channel (a new poll, results, closing) are posted
//! top-level; everything addressed to the requester goes into their thread.

use std::fmt::Write;

use super::command::{CommandError, HELP_TEXT};
use super::config::{Poll, PollResults};
use super::engine::{PollError, VoteReceipt};

/// Text to post back to the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Reply in the requester's thread instead of top-level
    pub threaded: bool,
}

impl Reply {
    pub fn threaded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            threaded: true,
        }
    }

    pub fn top_level(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            threaded: false,
        }
    }
}

/// Operation a reply is rendered for, used to word storage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Vote,
    Result,
    Close,
    Delete,
}

impl Operation {
    fn failure_text(self) -> &'static str {
        match self {
            Operation::Create => "Error: could not create the poll, please try again later",
            Operation::Vote => "Error: could not save your vote, please try again later",
            Operation::Result => "Error: could not load the poll results, please try again later",
            Operation::Close => "Error: could not close the poll, please try again later",
            Operation::Delete => "Error: could not delete the poll, please try again later",
        }
    }
}

/// Announcement for a freshly created poll
pub fn poll_created(poll: &Poll) -> Reply {
    let mut text = format!("📊 *Poll #{}*\n*{}*\n\n", poll.id, poll.question);
    for (i, option) in poll.options.iter().enumerate() {
        let _ = writeln!(text, "🔹 {}. {}", i + 1, option);
    }
    Reply::top_level(text)
}

pub fn vote_counted(receipt: &VoteReceipt) -> Reply {
    Reply::threaded(format!("✅ Your vote for *{}* has been counted!", receipt.label))
}

/// Tally listing for every option, zero-vote options included
pub fn poll_results(results: &PollResults) -> Reply {
    let mut text = format!(
        "📊 *Results for poll #{}*\n*{}*\n\n",
        results.poll_id, results.question
    );
    for tally in &results.tallies {
        let _ = writeln!(
            text,
            "🔹 {}. {} - {} vote(s)",
            tally.position, tally.label, tally.votes
        );
    }
    if results.closed {
        text.push_str("\nVoting is closed.\n");
    }
    Reply::top_level(text)
}

pub fn poll_closed(poll: &Poll) -> Reply {
    Reply::top_level(format!("✅ Poll #{} is closed!", poll.id))
}

pub fn poll_deleted() -> Reply {
    Reply::threaded("🗑 Poll deleted!")
}

pub fn help() -> Reply {
    Reply::threaded(HELP_TEXT)
}

pub fn malformed(err: &CommandError) -> Reply {
    Reply::threaded(format!("Error: invalid command format. Use {}", err.usage()))
}

/// User-facing text for an engine failure
///
/// Storage failures are reported generically; the cause is logged by the
/// caller and never shown in the channel.
pub fn engine_error(op: Operation, err: &PollError) -> Reply {
    let text = match err {
        PollError::NotFound(_) => "Error: poll not found".to_string(),
        PollError::Forbidden => match op {
            Operation::Delete => "Error: only the poll creator can delete it".to_string(),
            _ => "Error: only the poll creator can close it".to_string(),
        },
        PollError::PollClosed => "This poll is closed".to_string(),
        PollError::AlreadyVoted => "You have already voted!".to_string(),
        PollError::InvalidOption { options, .. } => {
            format!("Error: invalid option number, choose between 1 and {}", options)
        }
        PollError::InvalidPoll(reason) => format!("Error: {}", reason),
        PollError::StorageUnavailable(_) => op.failure_text().to_string(),
    };
    Reply::threaded(text)
}
