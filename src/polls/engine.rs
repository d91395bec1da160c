//! Poll Engine
//!
//! Enforces the voting rules on top of a [`PollStore`]. The engine keeps no
//! poll state of its own; every read-modify-write on a poll runs under that
//! poll's entry in a lock table so concurrent votes cannot overwrite each other.

use super::config::{Poll, PollResults};
use super::store::{PollStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Default bound on a single store round trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts at finding an unused poll ID before giving up
const MAX_ID_ATTEMPTS: usize = 3;

/// Engine errors
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Poll '{0}' not found")]
    NotFound(String),

    #[error("Only the poll creator can do that")]
    Forbidden,

    #[error("Poll is closed")]
    PollClosed,

    #[error("You have already voted")]
    AlreadyVoted,

    #[error("Option {position} is out of range (1-{options})")]
    InvalidOption { position: i64, options: usize },

    #[error("Invalid poll: {0}")]
    InvalidPoll(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for PollError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PollError::NotFound(id),
            StoreError::DuplicateKey(id) => {
                PollError::StorageUnavailable(format!("duplicate poll ID '{}'", id))
            }
            StoreError::Unavailable(msg) => PollError::StorageUnavailable(msg),
        }
    }
}

/// Confirmation of an accepted ballot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    /// Poll voted in
    pub poll_id: String,
    /// Chosen 1-based position
    pub position: u32,
    /// Chosen option label
    pub label: String,
}

/// Per-poll async locks, created on demand and dropped when idle
#[derive(Debug, Default)]
pub struct PollLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held lock for one poll
pub struct PollLockGuard<'a> {
    // Field order matters: the mutex guard must release its reference
    // before the entry checks whether it can be removed.
    _guard: OwnedMutexGuard<()>,
    _entry: LockEntry<'a>,
}

/// Interest in one lock-table entry. Dropping the last one removes the entry,
/// whether it belonged to a holder or to a waiter that gave up.
struct LockEntry<'a> {
    owner: &'a PollLocks,
    poll_id: String,
}

impl PollLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a poll
    pub async fn acquire(&self, poll_id: &str) -> PollLockGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(poll_id.to_string()).or_default().clone()
        };
        let entry = LockEntry {
            owner: self,
            poll_id: poll_id.to_string(),
        };
        let guard = lock.lock_owned().await;
        PollLockGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of polls with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no poll currently has a lock entry
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock();
        // Only the table's own reference left: nobody holds or waits on it
        if locks
            .get(&self.poll_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.poll_id);
        }
    }
}

/// Poll engine for managing polls
pub struct PollEngine {
    store: Arc<dyn PollStore>,
    locks: PollLocks,
    store_timeout: Duration,
}

impl PollEngine {
    /// Create a new poll engine on top of a store
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self {
            store,
            locks: PollLocks::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Set the bound on each store call
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Lock table (exposed for inspection)
    pub fn locks(&self) -> &PollLocks {
        &self.locks
    }

    async fn with_timeout<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "{} timed out after {:?}",
                op, self.store_timeout
            ))),
        };
        if let Err(StoreError::Unavailable(msg)) = &result {
            warn!(operation = op, error = %msg, "Poll store call failed");
        }
        result
    }

    /// Create a new open poll
    pub async fn create_poll(
        &self,
        question: &str,
        options: Vec<String>,
        creator_id: &str,
    ) -> Result<Poll, PollError> {
        let mut poll = Poll::new(generate_poll_id(), question, options, creator_id)
            .map_err(PollError::InvalidPoll)?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            match self.with_timeout("create", self.store.create(&poll)).await {
                Ok(id) => {
                    poll.id = id;
                    info!(poll_id = %poll.id, creator = %creator_id, options = poll.options.len(), "Poll created");
                    return Ok(poll);
                }
                Err(StoreError::DuplicateKey(id)) => {
                    debug!(poll_id = %id, attempt, "Poll ID collision, retrying");
                    poll.id = generate_poll_id();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PollError::StorageUnavailable(format!(
            "no unused poll ID after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    /// Get a poll by ID
    pub async fn get_poll(&self, poll_id: &str) -> Result<Poll, PollError> {
        Ok(self.with_timeout("get", self.store.get(poll_id)).await?)
    }

    /// Cast a vote
    pub async fn cast_vote(
        &self,
        poll_id: &str,
        voter_id: &str,
        position: i64,
    ) -> Result<VoteReceipt, PollError> {
        let _guard = self.locks.acquire(poll_id).await;
        let mut poll = self.get_poll(poll_id).await?;

        if poll.closed {
            return Err(PollError::PollClosed);
        }

        if poll.has_voted(voter_id) {
            return Err(PollError::AlreadyVoted);
        }

        let label = poll
            .option_label(position)
            .map(str::to_string)
            .ok_or(PollError::InvalidOption {
                position,
                options: poll.options.len(),
            })?;
        // option_label only succeeds for 1..=options.len()
        let position = position as u32;

        poll.ballots.insert(voter_id.to_string(), position);
        self.with_timeout(
            "update_ballots",
            self.store.update_ballots(poll_id, &poll.ballots),
        )
        .await?;

        debug!(poll_id = %poll_id, voter = %voter_id, position, "Vote recorded");
        Ok(VoteReceipt {
            poll_id: poll.id,
            position,
            label,
        })
    }

    /// Get results for a poll
    pub async fn get_results(&self, poll_id: &str) -> Result<PollResults, PollError> {
        Ok(self.get_poll(poll_id).await?.tally())
    }

    /// Close a poll. Closing a closed poll succeeds again.
    pub async fn close_poll(&self, poll_id: &str, requester_id: &str) -> Result<Poll, PollError> {
        let _guard = self.locks.acquire(poll_id).await;
        let mut poll = self.get_poll(poll_id).await?;

        if !poll.is_creator(requester_id) {
            return Err(PollError::Forbidden);
        }

        self.with_timeout("update_status", self.store.update_status(poll_id, true))
            .await?;
        poll.closed = true;

        info!(poll_id = %poll_id, "Poll closed");
        Ok(poll)
    }

    /// Delete a poll
    pub async fn delete_poll(&self, poll_id: &str, requester_id: &str) -> Result<(), PollError> {
        let _guard = self.locks.acquire(poll_id).await;
        let poll = self.get_poll(poll_id).await?;

        if !poll.is_creator(requester_id) {
            return Err(PollError::Forbidden);
        }

        self.with_timeout("delete", self.store.delete(poll_id)).await?;

        info!(poll_id = %poll_id, "Poll deleted");
        Ok(())
    }
}

/// Generate a 128-bit random poll ID
fn generate_poll_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
