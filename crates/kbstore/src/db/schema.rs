//! Per-schema table setup.
//!
//! Every root schema name owns one node table plus its link and field
//! tables. Table SQL is templated on the schema name; applied template
//! versions are tracked per schema in a `_schemas` table so setup is
//! idempotent.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{params, Connection};

use super::error::DatabaseError;

static RE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A single table template.
struct SchemaStep {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All templates in order. Each is applied at most once per schema.
const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        description: "create_node_tables",
        sql: include_str!("sql/001_create_nodes.sql"),
    },
    SchemaStep {
        version: 2,
        description: "create_field_tables",
        sql: include_str!("sql/002_create_field_tables.sql"),
    },
    SchemaStep {
        version: 3,
        description: "create_rpc_tables",
        sql: include_str!("sql/003_create_rpc_tables.sql"),
    },
];

/// Resolved table names for one schema, each already quoted for
/// splicing into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub nodes: String,
    pub kb: String,
    pub link: String,
    pub link_mount: String,
    pub status: String,
    pub job: String,
    pub stream: String,
    pub rpc_client: String,
    pub rpc_server: String,
}

impl TableNames {
    /// Builds the table names for `schema`. The schema must already be a
    /// valid identifier.
    pub fn new(schema: &str) -> Self {
        Self {
            nodes: quote_identifier(schema),
            kb: quote_identifier(&format!("{schema}_kb")),
            link: quote_identifier(&format!("{schema}_link")),
            link_mount: quote_identifier(&format!("{schema}_link_mount")),
            status: quote_identifier(&format!("{schema}_status")),
            job: quote_identifier(&format!("{schema}_job")),
            stream: quote_identifier(&format!("{schema}_stream")),
            rpc_client: quote_identifier(&format!("{schema}_rpc_client")),
            rpc_server: quote_identifier(&format!("{schema}_rpc_server")),
        }
    }
}

/// Wraps a validated identifier in double quotes so SQL keywords such as
/// `order` still work as table names.
fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

/// Checks that `name` is safe to splice into SQL as a table name.
pub fn validate_identifier(name: &str) -> bool {
    RE_IDENTIFIER.is_match(name)
}

/// Creates all tables of `schema` that are not yet present.
pub fn ensure_schema(conn: &Connection, schema: &str) -> Result<TableNames, DatabaseError> {
    if !validate_identifier(schema) {
        return Err(DatabaseError::InvalidIdentifier(schema.to_string()));
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _schemas (
            schema_name TEXT NOT NULL,
            version INTEGER NOT NULL,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (schema_name, version)
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _schemas WHERE schema_name = ?1",
        params![schema],
        |r| r.get(0),
    )?;

    for step in STEPS {
        if step.version <= current_version {
            continue;
        }

        log::info!(
            "Applying schema step v{} for '{}': {}",
            step.version,
            schema,
            step.description
        );

        let sql = step.sql.replace("{schema}", schema);
        conn.execute_batch(&sql).map_err(|source| DatabaseError::Schema {
            schema: schema.to_string(),
            version: step.version,
            step: step.description,
            source,
        })?;

        conn.execute(
            "INSERT INTO _schemas (schema_name, version, description) VALUES (?1, ?2, ?3)",
            params![schema, step.version, step.description],
        )?;
    }

    Ok(TableNames::new(schema))
}
