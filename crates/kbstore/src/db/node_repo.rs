//! Node repository: the materialized-path table and the knowledge-base
//! registry of one schema.

use rusqlite::{params, Connection, Row};
use serde_json::Value;

use super::{json_column, Database, DatabaseError, TableNames};

/// A node row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: i64,
    pub knowledge_base: String,
    pub label: String,
    pub name: String,
    pub properties: Value,
    pub data: Value,
    pub path: String,
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            knowledge_base: row.get("knowledge_base")?,
            label: row.get("label")?,
            name: row.get("name")?,
            properties: json_column(row, "properties")?,
            data: json_column(row, "data")?,
            path: row.get("path")?,
        })
    }

    /// The `description` stored in the node's properties, if any.
    pub fn description(&self) -> Option<&str> {
        self.properties.get("description").and_then(Value::as_str)
    }
}

/// A node about to be written.
#[derive(Debug, Clone)]
pub struct NewNode<'a> {
    pub knowledge_base: &'a str,
    pub label: &'a str,
    pub name: &'a str,
    pub properties: &'a Value,
    pub data: &'a Value,
    pub path: &'a str,
}

/// Inserts a node row and returns its id.
pub fn insert(
    db: &Database,
    tables: &TableNames,
    node: &NewNode<'_>,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO {} (knowledge_base, label, name, properties, data, path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                tables.nodes
            ),
            params![
                node.knowledge_base,
                node.label,
                node.name,
                node.properties.to_string(),
                node.data.to_string(),
                node.path,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Returns true if a node exists at `path`.
pub fn exists(db: &Database, tables: &TableNames, path: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE path = ?1", tables.nodes),
            params![path],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Finds a node by its materialized path.
pub fn find_by_path(
    db: &Database,
    tables: &TableNames,
    path: &str,
) -> Result<Option<NodeRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} WHERE path = ?1", tables.nodes))?;
        let mut rows = stmt.query_map(params![path], NodeRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns every node of the schema, ordered by path.
pub fn list_all(db: &Database, tables: &TableNames) -> Result<Vec<NodeRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY path", tables.nodes))?;
        let rows = stmt
            .query_map([], NodeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns all nodes carrying `label`. Takes a bare connection so it can
/// run inside a reconcile transaction.
pub fn select_by_label(
    conn: &Connection,
    tables: &TableNames,
    label: &str,
) -> Result<Vec<NodeRow>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} WHERE label = ?1 ORDER BY path",
        tables.nodes
    ))?;
    let rows = stmt
        .query_map(params![label], NodeRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns `path` itself (if present) and every hierarchical descendant.
pub fn descendant_paths(
    db: &Database,
    tables: &TableNames,
    path: &str,
) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        // substr comparison avoids LIKE wildcard escaping on `_` and `%`.
        let mut stmt = conn.prepare(&format!(
            "SELECT path FROM {} WHERE path = ?1
             OR substr(path, 1, length(?1) + 1) = ?1 || '.'
             ORDER BY path",
            tables.nodes
        ))?;
        let rows = stmt
            .query_map(params![path], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Registers a knowledge base.
pub fn insert_kb(
    db: &Database,
    tables: &TableNames,
    name: &str,
    description: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!("INSERT INTO {} (name, description) VALUES (?1, ?2)", tables.kb),
            params![name, description],
        )?;
        Ok(())
    })
}

/// Returns `(name, description)` for every registered knowledge base.
pub fn list_kbs(
    db: &Database,
    tables: &TableNames,
) -> Result<Vec<(String, String)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT name, description FROM {} ORDER BY name",
            tables.kb
        ))?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Removes every declaration (nodes, knowledge bases, links) so a new
/// construction pass starts from an empty tree. Field tables are kept.
pub fn clear_declarations(db: &Database, tables: &TableNames) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        for table in [&tables.nodes, &tables.kb, &tables.link, &tables.link_mount] {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }
        Ok(())
    })
}
