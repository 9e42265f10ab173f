use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("{kind} already exists: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error(
        "Stack mismatch leaving header node: expected ({expected_link}, {expected_name}), found ({}, {})",
        .actual_link.as_deref().unwrap_or("<empty>"),
        .actual_name.as_deref().unwrap_or("<empty>")
    )]
    Structural {
        expected_link: String,
        expected_name: String,
        actual_link: Option<String>,
        actual_name: Option<String>,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(
        "{context}{}",
        .source.as_ref().map(|s| format!(": {s}")).unwrap_or_default()
    )]
    Runtime {
        context: String,
        #[source]
        source: Option<Box<KbError>>,
    },

    #[error("Illegal state transition at '{path}': {from} -> {to}")]
    IllegalTransition {
        path: String,
        from: String,
        to: String,
    },

    #[error("No free slot at '{0}'")]
    QueueFull(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl KbError {
    pub(crate) fn runtime(context: impl Into<String>, source: KbError) -> Self {
        KbError::Runtime {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        KbError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        KbError::Duplicate {
            kind,
            name: name.into(),
        }
    }
}

impl From<rusqlite::Error> for KbError {
    fn from(err: rusqlite::Error) -> Self {
        KbError::Database(DatabaseError::Sqlite(err))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, KbError>;
