//! Store error taxonomy.
//!
//! Every mutation entry point reports through these variants so the HTTP
//! layer can map them to status codes without string matching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input, rejected before any write.
    #[error("validation error: {0}")]
    Validation(String),

    /// A move or reorder referenced a lecture that is not a member of the
    /// target collection, or the reorder set does not match the membership.
    #[error("membership mismatch: {0}")]
    MembershipMismatch(String),

    /// An optimistic-concurrency check failed: the collection was mutated
    /// by someone else since the caller read it.
    #[error("stale revision: expected {expected}, collection is at {actual}")]
    StaleRevision { expected: i64, actual: i64 },

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A foreign-key or uniqueness constraint rejected the write. Deleting
    /// a topic/tag/rank still referenced by lectures surfaces here.
    #[error("referential integrity violation: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(#[source] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Integrity(err.to_string())
            }
            _ => StoreError::Storage(err),
        }
    }
}
