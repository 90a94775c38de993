//! Centralized error types for esindex.

use std::path::PathBuf;
use thiserror::Error;

use crate::state::IndexState;

/// Errors produced by the search index and cache.
///
/// Expected conditions (a missing row, a write rejected because indexing is
/// disabled) are not errors; they are reported through
/// [`WriteOutcome`](crate::index::store::WriteOutcome) and `Option` results.
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The embedded database rejected an operation.
    #[error("Search index database error in '{path}': {source}")]
    Database {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// A persisted row could not be turned back into searchable content.
    #[error("Cannot decode entry '{message_id}': {reason}")]
    Decode { message_id: String, reason: String },

    /// The content cipher failed to seal or open a payload.
    #[error("Content encryption error: {0}")]
    Crypto(String),

    /// A state change that the indexing state machine does not allow.
    #[error("Invalid indexing state transition: {from} -> {to}")]
    InvalidTransition { from: IndexState, to: IndexState },
}

/// Convenience alias for `Result<T, IndexError>`.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Database` variant for the store at `path`.
    pub fn database(path: impl Into<PathBuf>, source: rusqlite::Error) -> Self {
        Self::Database {
            path: path.into(),
            source,
        }
    }

    /// Create a `Decode` variant for a single row.
    pub fn decode(message_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            message_id: message_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the device has run out of space.
    ///
    /// Callers use this to move indexing into the low-storage state instead
    /// of retrying.
    pub fn is_storage_exhausted(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::StorageFull,
            Self::Database { source, .. } => matches!(
                source.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DiskFull)
            ),
            _ => false,
        }
    }

    /// Whether this is a per-row decode failure that a scan should skip.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Crypto(_))
    }
}
