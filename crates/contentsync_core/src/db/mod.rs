//! Content store database: connection setup and schema versioning.
//!
//! The schema holds three tables: `content_units` (one row per natural key),
//! `repo_content_units` (repository membership) and `unit_children`
//! (parent/child links). Every uniqueness rule the engine relies on for
//! idempotent writes is a table constraint declared in `migrations/`.
//!
//! # Invariants
//! - Each sync worker owns its connection; file databases run in WAL mode
//!   with a busy timeout so writers queue on the lock.
//! - A connection is handed out only after its schema reached
//!   `migrations::latest_version()`.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{
    open_db, open_db_in_memory, open_db_with_busy_timeout, open_db_with_config,
    DEFAULT_BUSY_TIMEOUT,
};

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or migrating the content store.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer engine; opening it could corrupt it.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "content store sqlite error: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "content store schema v{db_version} requires a newer engine (this one knows up to v{latest_supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Self::Sqlite(err) = self {
            return Some(err);
        }
        None
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
