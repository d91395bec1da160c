//! Poll Store
//!
//! Keyed-record persistence for polls. The engine owns all validation; a store
//! only guarantees that each call is atomic with respect to other calls on the
//! same record.

use super::config::Poll;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Poll '{0}' not found")]
    NotFound(String),

    #[error("Poll '{0}' already exists")]
    DuplicateKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for poll records
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Persist a new poll under its own ID and return that ID
    async fn create(&self, poll: &Poll) -> StoreResult<String>;

    /// Fetch a poll by ID
    async fn get(&self, id: &str) -> StoreResult<Poll>;

    /// Replace the ballot map of a poll
    async fn update_ballots(&self, id: &str, ballots: &HashMap<String, u32>) -> StoreResult<()>;

    /// Set the closed flag of a poll
    async fn update_status(&self, id: &str, closed: bool) -> StoreResult<()>;

    /// Remove a poll. Removing a missing poll is not an error.
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

/// In-process poll store
#[derive(Debug)]
pub struct MemoryPollStore {
    polls: RwLock<HashMap<String, Poll>>,
    available: AtomicBool,
}

impl Default for MemoryPollStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPollStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            polls: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the backing connection
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored polls
    pub fn len(&self) -> usize {
        self.polls.read().len()
    }

    /// Whether the store holds no polls
    pub fn is_empty(&self) -> bool {
        self.polls.read().is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn create(&self, poll: &Poll) -> StoreResult<String> {
        self.check_available()?;
        let mut polls = self.polls.write();
        if polls.contains_key(&poll.id) {
            return Err(StoreError::DuplicateKey(poll.id.clone()));
        }
        polls.insert(poll.id.clone(), poll.clone());
        Ok(poll.id.clone())
    }

    async fn get(&self, id: &str) -> StoreResult<Poll> {
        self.check_available()?;
        self.polls
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update_ballots(&self, id: &str, ballots: &HashMap<String, u32>) -> StoreResult<()> {
        self.check_available()?;
        let mut polls = self.polls.write();
        let poll = polls
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        poll.ballots = ballots.clone();
        Ok(())
    }

    async fn update_status(&self, id: &str, closed: bool) -> StoreResult<()> {
        self.check_available()?;
        let mut polls = self.polls.write();
        let poll = polls
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        poll.closed = closed;
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.check_available()?;
        self.polls.write().remove(id);
        Ok(())
    }
}

/// SQLite-backed poll store
pub struct SqlitePollStore {
    pool: Pool<Sqlite>,
}

impl SqlitePollStore {
    /// Connect to the database at `url` and make sure the schema exists
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Unavailable(format!("Invalid store URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {}", e)))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    async fn init(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                options TEXT NOT NULL,
                ballots TEXT NOT NULL,
                creator_id TEXT NOT NULL,
                closed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    fn row_to_poll(row: &SqliteRow) -> StoreResult<Poll> {
        let id: String = row.try_get("id").map_err(unavailable)?;
        let options: String = row.try_get("options").map_err(unavailable)?;
        let ballots: String = row.try_get("ballots").map_err(unavailable)?;

        let corrupt = |e: serde_json::Error| {
            StoreError::Unavailable(format!("Corrupt record '{}': {}", id, e))
        };
        let options: Vec<String> = serde_json::from_str(&options).map_err(corrupt)?;
        let ballots: HashMap<String, u32> = serde_json::from_str(&ballots).map_err(corrupt)?;

        Ok(Poll {
            question: row.try_get("question").map_err(unavailable)?,
            options,
            ballots,
            creator_id: row.try_get("creator_id").map_err(unavailable)?,
            closed: row.try_get("closed").map_err(unavailable)?,
            id,
        })
    }

    fn ensure_updated(id: &str, rows_affected: u64) -> StoreResult<()> {
        if rows_affected == 0 {
            Err(StoreError::NotFound(id.to_string()))
        } else {
            Ok(())
        }
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Unavailable(e.to_string()))
}

#[async_trait]
impl PollStore for SqlitePollStore {
    async fn create(&self, poll: &Poll) -> StoreResult<String> {
        let result = sqlx::query(
            r#"
            INSERT INTO polls (id, question, options, ballots, creator_id, closed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.question)
        .bind(encode(&poll.options)?)
        .bind(encode(&poll.ballots)?)
        .bind(&poll.creator_id)
        .bind(poll.closed)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(poll.id.clone()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateKey(poll.id.clone()))
            }
            Err(e) => Err(StoreError::Unavailable(format!("Failed to insert poll: {}", e))),
        }
    }

    async fn get(&self, id: &str) -> StoreResult<Poll> {
        let row = sqlx::query(
            r#"
            SELECT id, question, options, ballots, creator_id, closed
            FROM polls
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to query poll: {}", e)))?;

        match row {
            Some(row) => Self::row_to_poll(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn update_ballots(&self, id: &str, ballots: &HashMap<String, u32>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE polls SET ballots = ?1 WHERE id = ?2")
            .bind(encode(ballots)?)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to update ballots: {}", e)))?;

        Self::ensure_updated(id, result.rows_affected())
    }

    async fn update_status(&self, id: &str, closed: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE polls SET closed = ?1 WHERE id = ?2")
            .bind(closed)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to update status: {}", e)))?;

        Self::ensure_updated(id, result.rows_affected())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM polls WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to delete poll: {}", e)))?;

        Ok(())
    }
}
