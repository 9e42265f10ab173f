//! Status slots: one JSON object per declared status path.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::db::{Database, TableNames};
use crate::error::{KbError, Result};

/// Reads the payload of a status field.
pub fn get_status(db: &Database, tables: &TableNames, path: &str) -> Result<Value> {
    let raw: Option<String> = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                &format!("SELECT data FROM {} WHERE path = ?1", tables.status),
                params![path],
                |r| r.get(0),
            )
            .optional()?)
    })?;
    let raw = raw.ok_or_else(|| KbError::not_found("status field", path))?;
    serde_json::from_str(&raw)
        .map_err(|e| KbError::Validation(format!("corrupt status payload at '{}': {}", path, e)))
}

/// Replaces the payload of a status field. The payload must be an object.
pub fn set_status(db: &Database, tables: &TableNames, path: &str, data: &Value) -> Result<()> {
    if !data.is_object() {
        return Err(KbError::Validation(format!(
            "status payload for '{}' must be an object",
            path
        )));
    }
    let updated = db.with_conn(|conn| {
        Ok(conn.execute(
            &format!("UPDATE {} SET data = ?2 WHERE path = ?1", tables.status),
            params![path, data.to_string()],
        )?)
    })?;
    if updated == 0 {
        return Err(KbError::not_found("status field", path));
    }
    Ok(())
}
