//! Error taxonomy for the league engine
//!
//! `StoreError` is what a storage backend reports; `LeagueError` is what the
//! engine surfaces to its callers. Only `StoreError::Unavailable` is treated
//! as transient and retried.

use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached or the statement failed transiently
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The season exists but no longer accepts XP (already ended)
    #[error("season {0} is not open for xp")]
    SeasonNotOpen(Uuid),

    /// A uniqueness or state constraint rejected the write
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// A row could not be decoded into a domain value
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::Decode(e) | sqlx::Error::ColumnDecode { source: e, .. } => {
                StoreError::Corrupt(e.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LeagueError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Season state is inconsistent; rollover must halt for an operator
    #[error("consistency error: {0}")]
    Consistency(String),
}

pub type LeagueResult<T> = std::result::Result<T, LeagueError>;
