//! Store error types.

use thiserror::Error;

/// Errors from the paste store and its SQLite repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite rejected a statement or could not be opened.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Creating the database directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be decoded.
    #[error("corrupt paste row {id}: {message}")]
    CorruptRow {
        /// Row ID.
        id: i64,
        /// What was wrong with it.
        message: String,
    },

    /// SQLite handed out an id at or below one already issued.
    #[error("database assigned paste id {assigned}, expected at least {expected}")]
    IdRegression {
        /// Row ID SQLite assigned.
        assigned: i64,
        /// Smallest id the store may issue next.
        expected: i64,
    },
}
