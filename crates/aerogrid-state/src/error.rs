//! State store errors.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Failures reading or writing the AeroGrid database. redb's own error
/// types are flattened to text so callers need no redb dependency.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    #[error("cannot open table: {0}")]
    Table(String),

    #[error("state read failed: {0}")]
    Read(String),

    #[error("state write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Encode(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}
