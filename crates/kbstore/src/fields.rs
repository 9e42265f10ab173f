//! Field kinds and the catalog of field declarations.
//!
//! A field declaration is an ordinary node whose label is one of the
//! field-kind tags. Each kind owns one auxiliary table that the matching
//! reconciler keeps in line with the declarations.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{node_repo, TableNames};
use crate::error::{KbError, Result};

/// The closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Status,
    Job,
    Stream,
    RpcClient,
    RpcServer,
}

impl FieldKind {
    /// All kinds, in reconciliation order.
    pub const ALL: [FieldKind; 5] = [
        FieldKind::Status,
        FieldKind::Job,
        FieldKind::Stream,
        FieldKind::RpcClient,
        FieldKind::RpcServer,
    ];

    /// The node label marking a declaration of this kind.
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Status => "KB_STATUS_FIELD",
            FieldKind::Job => "KB_JOB_QUEUE",
            FieldKind::Stream => "KB_STREAM_FIELD",
            FieldKind::RpcClient => "KB_RPC_CLIENT_FIELD",
            FieldKind::RpcServer => "KB_RPC_SERVER_FIELD",
        }
    }

    /// The property holding the declared size, for sized kinds.
    pub fn size_key(&self) -> Option<&'static str> {
        match self {
            FieldKind::Status => None,
            FieldKind::Job | FieldKind::Stream => Some("length"),
            FieldKind::RpcClient | FieldKind::RpcServer => Some("queue_depth"),
        }
    }

    /// The auxiliary table of this kind within `tables`.
    pub fn table<'a>(&self, tables: &'a TableNames) -> &'a str {
        match self {
            FieldKind::Status => &tables.status,
            FieldKind::Job => &tables.job,
            FieldKind::Stream => &tables.stream,
            FieldKind::RpcClient => &tables.rpc_client,
            FieldKind::RpcServer => &tables.rpc_server,
        }
    }

    /// The column holding the path reference in this kind's table.
    pub fn path_column(&self) -> &'static str {
        match self {
            FieldKind::RpcClient => "client_path",
            FieldKind::RpcServer => "server_path",
            _ => "path",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Status => write!(f, "status"),
            FieldKind::Job => write!(f, "job"),
            FieldKind::Stream => write!(f, "stream"),
            FieldKind::RpcClient => write!(f, "rpc_client"),
            FieldKind::RpcServer => write!(f, "rpc_server"),
        }
    }
}

/// One declared field, as read back from the node table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    pub path: String,
    /// Declared row count; `None` for status fields.
    pub size: Option<usize>,
    /// Seed payload; only status fields carry one.
    pub initial_data: Value,
}

/// Reads field declarations from the node table.
pub struct FieldCatalog;

impl FieldCatalog {
    /// Loads all declarations of `kind`, ordered by path.
    pub fn load(
        conn: &Connection,
        tables: &TableNames,
        kind: FieldKind,
    ) -> Result<Vec<FieldDeclaration>> {
        let rows = node_repo::select_by_label(conn, tables, kind.label())?;
        rows.into_iter()
            .map(|row| {
                let size = match kind.size_key() {
                    Some(key) => Some(parse_size(&row.properties, key).ok_or_else(|| {
                        KbError::Validation(format!(
                            "{} field '{}' has no valid '{}' property",
                            kind, row.path, key
                        ))
                    })?),
                    None => None,
                };
                Ok(FieldDeclaration {
                    path: row.path,
                    size,
                    initial_data: row.data,
                })
            })
            .collect()
    }
}

fn parse_size(properties: &Value, key: &str) -> Option<usize> {
    properties
        .get(key)
        .and_then(Value::as_u64)
        .filter(|n| *n >= 1)
        .map(|n| n as usize)
}
