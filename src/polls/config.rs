//! Poll Model
//!
//! The poll record and the tallies derived from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum number of options a poll must offer
pub const MIN_OPTIONS: usize = 2;

/// A single-question poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    /// Poll ID (unique identifier, immutable)
    pub id: String,
    /// Poll question
    pub question: String,
    /// Option labels, referenced by 1-based position
    pub options: Vec<String>,
    /// Ballots by voter (voter_id -> 1-based option position)
    #[serde(default)]
    pub ballots: HashMap<String, u32>,
    /// User ID of poll creator
    pub creator_id: String,
    /// Whether voting has ended
    #[serde(default)]
    pub closed: bool,
}

impl Poll {
    /// Create a new open poll with no ballots
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        options: Vec<String>,
        creator_id: impl Into<String>,
    ) -> Result<Self, String> {
        let poll = Self {
            id: id.into(),
            question: question.into(),
            options,
            ballots: HashMap::new(),
            creator_id: creator_id.into(),
            closed: false,
        };
        poll.validate()?;
        Ok(poll)
    }

    /// Validate the record
    pub fn validate(&self) -> Result<(), String> {
        if self.question.is_empty() {
            return Err("Poll question is required".to_string());
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(format!("Poll must have at least {} options", MIN_OPTIONS));
        }
        if self.options.iter().any(|o| o.is_empty()) {
            return Err("Poll options cannot be empty".to_string());
        }
        Ok(())
    }

    /// Label of the option at a 1-based position
    pub fn option_label(&self, position: i64) -> Option<&str> {
        if position < 1 {
            return None;
        }
        let index = usize::try_from(position - 1).ok()?;
        self.options.get(index).map(String::as_str)
    }

    /// Check if a user has voted
    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.ballots.contains_key(voter_id)
    }

    /// Check if a user created this poll
    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    /// Count ballots per option, in option order
    pub fn tally(&self) -> PollResults {
        let mut counts = vec![0u32; self.options.len()];
        for &position in self.ballots.values() {
            // Out-of-range values can only come from a corrupt record
            if let Some(count) = (position as usize)
                .checked_sub(1)
                .and_then(|i| counts.get_mut(i))
            {
                *count += 1;
            }
        }

        let tallies: Vec<OptionTally> = self
            .options
            .iter()
            .zip(counts)
            .enumerate()
            .map(|(i, (label, votes))| OptionTally {
                position: i as u32 + 1,
                label: label.clone(),
                votes,
            })
            .collect();
        let total_votes = tallies.iter().map(|t| t.votes).sum();

        PollResults {
            poll_id: self.id.clone(),
            question: self.question.clone(),
            tallies,
            total_votes,
            closed: self.closed,
        }
    }
}

/// Vote count for one option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    /// 1-based option position
    pub position: u32,
    /// Option label
    pub label: String,
    /// Number of ballots for this option
    pub votes: u32,
}

/// Poll results summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    /// Poll ID
    pub poll_id: String,
    /// Poll question
    pub question: String,
    /// One entry per option, in option order
    pub tallies: Vec<OptionTally>,
    /// Total number of counted ballots
    pub total_votes: u32,
    /// Whether the poll is closed
    pub closed: bool,
}

impl PollResults {
    /// Vote count for an option label
    pub fn votes_for(&self, label: &str) -> Option<u32> {
        self.tallies
            .iter()
            .find(|t| t.label == label)
            .map(|t| t.votes)
    }
}
