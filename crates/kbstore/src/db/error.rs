//! Store-level errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The parent directory of the database file could not be created.
    #[error("cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema name that cannot be used as a table prefix.
    #[error("invalid schema name '{0}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    /// A table template failed to apply.
    #[error("schema '{schema}' step v{version} ({step}) failed: {source}")]
    Schema {
        schema: String,
        version: u32,
        step: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database lock poisoned")]
    LockPoisoned,
}
