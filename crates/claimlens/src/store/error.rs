//! Status store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from status store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The store lock was poisoned.
    #[error("Status store lock poisoned")]
    LockPoisoned,

    /// A status update referenced a query that was never registered.
    /// Signals a programming or race error; silently dropping the update
    /// would break the stage/status invariants.
    #[error("Query '{0}' not found in status store")]
    QueryNotFound(String),

    /// The stages column held something other than a stage map.
    #[error("Corrupt stage map for query '{query_id}': {reason}")]
    CorruptStageMap { query_id: String, reason: String },
}
