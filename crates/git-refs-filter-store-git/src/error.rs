//! Error types for change metadata store operations.

use git_refs_filter_core::{ChangeId, ChangeStatusParseError};
use git2::Oid;
use thiserror::Error;

/// Errors that can occur during `GitChangeStore` operations.
#[derive(Error, Debug)]
pub enum GitStoreError {
    /// No `Status:` footer anywhere in the change's metadata history.
    #[error("Change {change} has no status in metadata revision {revision}")]
    MissingStatus {
        /// Change being decoded.
        change: ChangeId,
        /// Meta ref revision that was read.
        revision: Oid,
    },

    /// The `Status:` footer holds an unknown value.
    #[error("Change {change} has invalid status in metadata revision {revision}: {source}")]
    InvalidStatus {
        /// Change being decoded.
        change: ChangeId,
        /// Meta ref revision that was read.
        revision: Oid,
        /// Footer parse failure.
        #[source]
        source: ChangeStatusParseError,
    },

    /// Commit time cannot be represented.
    #[error("Change {change} has invalid update time {seconds} in metadata revision {revision}")]
    InvalidTimestamp {
        /// Change being decoded.
        change: ChangeId,
        /// Meta ref revision that was read.
        revision: Oid,
        /// Raw seconds since the epoch.
        seconds: i64,
    },

    /// Git repository error.
    #[error("Git repository error: {0}")]
    GitError(#[from] git2::Error),

    /// Failed to acquire repository lock.
    #[error("Repository lock error")]
    LockError,

    /// Other unclassified error.
    #[error("Other error: {0}")]
    Other(String),
}
