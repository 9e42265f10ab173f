//! Job queues and streams.
//!
//! A job queue is a fixed set of slots: a push fills the free slot that
//! completed longest ago, and completing a job frees its slot again. A
//! stream is a ring buffer: a push always overwrites the oldest record.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;

use super::require_path;
use crate::db::{json_column, now_timestamp, Database, TableNames};
use crate::error::{KbError, Result};

/// One row of a job or stream table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: i64,
    pub path: String,
    pub recorded_at: String,
    /// Job rows only.
    pub completed_at: Option<String>,
    pub valid: bool,
    pub data: Value,
}

impl QueueEntry {
    fn from_job_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            path: row.get("path")?,
            recorded_at: row.get("recorded_at")?,
            completed_at: row.get("completed_at")?,
            valid: row.get("valid")?,
            data: json_column(row, "data")?,
        })
    }

    fn from_stream_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            path: row.get("path")?,
            recorded_at: row.get("recorded_at")?,
            completed_at: None,
            valid: row.get("valid")?,
            data: json_column(row, "data")?,
        })
    }
}

/// Places `data` in a free job slot and returns the slot id.
pub fn push_job(db: &Database, tables: &TableNames, path: &str, data: &Value) -> Result<i64> {
    let table = &tables.job;
    db.with_transaction(|tx| {
        require_path(tx, table, "path", path, "job queue")?;
        let slot: Option<i64> = tx
            .query_row(
                &format!(
                    "SELECT id FROM {table} WHERE path = ?1 AND valid = 0
                     ORDER BY completed_at ASC, id ASC LIMIT 1"
                ),
                params![path],
                |r| r.get(0),
            )
            .optional()?;
        let id = slot.ok_or_else(|| KbError::QueueFull(path.to_string()))?;
        tx.execute(
            &format!("UPDATE {table} SET valid = 1, data = ?2, recorded_at = ?3 WHERE id = ?1"),
            params![id, data.to_string(), now_timestamp()],
        )?;
        log::debug!("Queued job {} at {}", id, path);
        Ok(id)
    })
}

/// Returns the oldest pending job without consuming it.
pub fn peek_job(db: &Database, tables: &TableNames, path: &str) -> Result<Option<QueueEntry>> {
    let table = &tables.job;
    db.with_transaction(|tx| {
        require_path(tx, table, "path", path, "job queue")?;
        Ok(tx
            .query_row(
                &format!(
                    "SELECT * FROM {table} WHERE path = ?1 AND valid = 1
                     ORDER BY recorded_at ASC, id ASC LIMIT 1"
                ),
                params![path],
                QueueEntry::from_job_row,
            )
            .optional()?)
    })
}

/// Marks a pending job done and frees its slot.
pub fn complete_job(db: &Database, tables: &TableNames, path: &str, id: i64) -> Result<()> {
    let updated = db.with_conn(|conn| {
        Ok(conn.execute(
            &format!(
                "UPDATE {} SET valid = 0, data = '{{}}', completed_at = ?3
                 WHERE id = ?1 AND path = ?2 AND valid = 1",
                tables.job
            ),
            params![id, path, now_timestamp()],
        )?)
    })?;
    if updated == 0 {
        return Err(KbError::not_found("pending job", format!("{}#{}", path, id)));
    }
    Ok(())
}

/// Returns `(pending, total)` slot counts of a job queue.
pub fn count_jobs(db: &Database, tables: &TableNames, path: &str) -> Result<(usize, usize)> {
    let (pending, total): (i64, i64) = db.with_conn(|conn| {
        Ok(conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(valid), 0), COUNT(*) FROM {} WHERE path = ?1",
                tables.job
            ),
            params![path],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
    })?;
    if total == 0 {
        return Err(KbError::not_found("job queue", path));
    }
    Ok((pending as usize, total as usize))
}

/// Writes `data` over the oldest record of a stream.
pub fn push_stream(db: &Database, tables: &TableNames, path: &str, data: &Value) -> Result<i64> {
    let table = &tables.stream;
    db.with_transaction(|tx| {
        let oldest: Option<i64> = tx
            .query_row(
                &format!(
                    "SELECT id FROM {table} WHERE path = ?1
                     ORDER BY recorded_at ASC, id ASC LIMIT 1"
                ),
                params![path],
                |r| r.get(0),
            )
            .optional()?;
        let id = oldest.ok_or_else(|| KbError::not_found("stream field", path))?;
        tx.execute(
            &format!("UPDATE {table} SET valid = 1, data = ?2, recorded_at = ?3 WHERE id = ?1"),
            params![id, data.to_string(), now_timestamp()],
        )?;
        Ok(id)
    })
}

/// Returns the valid records of a stream, oldest first.
pub fn read_stream(db: &Database, tables: &TableNames, path: &str) -> Result<Vec<QueueEntry>> {
    let table = &tables.stream;
    db.with_transaction(|tx| {
        require_path(tx, table, "path", path, "stream field")?;
        let mut stmt = tx.prepare(&format!(
            "SELECT * FROM {table} WHERE path = ?1 AND valid = 1
             ORDER BY recorded_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![path], QueueEntry::from_stream_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
