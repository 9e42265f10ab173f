//! Job and stream fields: bounded queues kept at their declared length.

use rusqlite::{params, Connection, Transaction};

use super::{converge_partitions, Partition, Reconcile, ReconcileReport};
use crate::db::{now_timestamp, TableNames};
use crate::error::Result;
use crate::fields::{FieldDeclaration, FieldKind};

/// Reconciler shared by the two bounded-queue kinds.
pub struct QueueReconciler {
    kind: FieldKind,
    batch_size: usize,
}

impl QueueReconciler {
    pub fn job(batch_size: usize) -> Self {
        Self {
            kind: FieldKind::Job,
            batch_size,
        }
    }

    pub fn stream(batch_size: usize) -> Self {
        Self {
            kind: FieldKind::Stream,
            batch_size,
        }
    }

    fn partition<'a>(&self, tables: &'a TableNames) -> Partition<'a> {
        match self.kind {
            FieldKind::Job => Partition {
                table: &tables.job,
                path_column: "path",
                age_column: "completed_at",
            },
            _ => Partition {
                table: &tables.stream,
                path_column: "path",
                age_column: "recorded_at",
            },
        }
    }
}

fn insert_job_placeholder(conn: &Connection, table: &str, path: &str) -> Result<()> {
    let now = now_timestamp();
    conn.execute(
        &format!(
            "INSERT INTO {table} (path, recorded_at, completed_at, valid, data)
             VALUES (?1, ?2, ?2, 0, '{{}}')"
        ),
        params![path, now],
    )?;
    Ok(())
}

fn insert_stream_placeholder(conn: &Connection, table: &str, path: &str) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO {table} (path, recorded_at, valid, data) VALUES (?1, ?2, 0, '{{}}')"),
        params![path, now_timestamp()],
    )?;
    Ok(())
}

impl Reconcile for QueueReconciler {
    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn reconcile(
        &self,
        tx: &Transaction<'_>,
        tables: &TableNames,
        declared: &[FieldDeclaration],
    ) -> Result<ReconcileReport> {
        let partition = self.partition(tables);
        let table = partition.table;
        match self.kind {
            FieldKind::Job => converge_partitions(
                tx,
                self.kind,
                &partition,
                declared,
                self.batch_size,
                |conn, path| insert_job_placeholder(conn, table, path),
            ),
            _ => converge_partitions(
                tx,
                self.kind,
                &partition,
                declared,
                self.batch_size,
                |conn, path| insert_stream_placeholder(conn, table, path),
            ),
        }
    }
}
