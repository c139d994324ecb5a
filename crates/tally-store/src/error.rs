//! Store error types.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the attempt store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No attempt with this id is stored.
    #[error("attempt not found: {0}")]
    AttemptNotFound(Uuid),

    /// A flag was raised without a reason.
    #[error("flag reason must not be empty")]
    EmptyFlagReason,

    /// A listing page was requested outside the allowed bounds.
    #[error("invalid page {page} with {per_page} per page (pages start at 1, 1-100 per page)")]
    InvalidPage { page: usize, per_page: usize },

    /// The snapshot file could not be read or written.
    #[error("snapshot I/O failed for {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file is not valid JSON for this version.
    #[error("snapshot {path} is corrupt: {message}")]
    CorruptSnapshot { path: PathBuf, message: String },
}

impl StoreError {
    /// Whether the error is a caller mistake rather than a storage failure.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StoreError::AttemptNotFound(_)
                | StoreError::EmptyFlagReason
                | StoreError::InvalidPage { .. }
        )
    }
}
