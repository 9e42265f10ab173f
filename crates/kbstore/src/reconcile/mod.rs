//! Reconcilers converge each field table to the current declarations.
//!
//! Every run reads the declarations of one kind, deletes rows whose path is
//! no longer declared, resizes sized partitions (oldest rows evicted first,
//! placeholders appended), and for RPC slots resets leftover transient
//! state. A run is one transaction: it either fully applies or leaves the
//! table untouched.

use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::Serialize;

use crate::db::{Database, TableNames};
use crate::error::{KbError, Result};
use crate::fields::{FieldCatalog, FieldDeclaration, FieldKind};

pub mod queue;
pub mod rpc_client;
pub mod rpc_server;
pub mod status;

pub use queue::QueueReconciler;
pub use rpc_client::RpcClientReconciler;
pub use rpc_server::RpcServerReconciler;
pub use status::StatusReconciler;

/// Default number of paths per `DELETE ... IN (...)` statement. Stays well
/// under SQLite's bound-parameter limit.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 500;

/// Largest batch one statement can bind (`SQLITE_MAX_VARIABLE_NUMBER`).
pub const MAX_DELETE_BATCH_SIZE: usize = 32766;

/// Counts of what a reconcile run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub kind: FieldKind,
    pub inserted: usize,
    pub deleted: usize,
    pub reset: usize,
}

impl ReconcileReport {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            inserted: 0,
            deleted: 0,
            reset: 0,
        }
    }

    /// True when the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.deleted == 0 && self.reset == 0
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: inserted={} deleted={} reset={}",
            self.kind, self.inserted, self.deleted, self.reset
        )
    }
}

/// A reconciler for one field kind.
pub trait Reconcile {
    fn kind(&self) -> FieldKind;

    /// Converges the kind's table to `declared` inside `tx`.
    fn reconcile(
        &self,
        tx: &Transaction<'_>,
        tables: &TableNames,
        declared: &[FieldDeclaration],
    ) -> Result<ReconcileReport>;
}

/// One reconciler per field kind.
pub struct ReconcilerSet {
    status: StatusReconciler,
    job: QueueReconciler,
    stream: QueueReconciler,
    rpc_client: RpcClientReconciler,
    rpc_server: RpcServerReconciler,
}

impl ReconcilerSet {
    pub fn new(delete_batch_size: usize) -> Self {
        Self {
            status: StatusReconciler::new(delete_batch_size),
            job: QueueReconciler::job(delete_batch_size),
            stream: QueueReconciler::stream(delete_batch_size),
            rpc_client: RpcClientReconciler::new(delete_batch_size),
            rpc_server: RpcServerReconciler::new(delete_batch_size),
        }
    }

    pub fn get(&self, kind: FieldKind) -> &dyn Reconcile {
        match kind {
            FieldKind::Status => &self.status,
            FieldKind::Job => &self.job,
            FieldKind::Stream => &self.stream,
            FieldKind::RpcClient => &self.rpc_client,
            FieldKind::RpcServer => &self.rpc_server,
        }
    }

    /// Reconcilers in the fixed run order.
    pub fn in_order(&self) -> impl Iterator<Item = &dyn Reconcile> + '_ {
        FieldKind::ALL.into_iter().map(move |kind| self.get(kind))
    }
}

impl Default for ReconcilerSet {
    fn default() -> Self {
        Self::new(DEFAULT_DELETE_BATCH_SIZE)
    }
}

/// Runs one reconciler in its own transaction.
///
/// Any failure rolls the run back and is reported as a runtime error
/// wrapping the cause.
pub fn run(
    db: &Database,
    tables: &TableNames,
    reconciler: &dyn Reconcile,
) -> Result<ReconcileReport> {
    let kind = reconciler.kind();
    let _span = tracing::info_span!("reconcile", kind = %kind).entered();

    let report = db
        .with_transaction(|tx| {
            let declared = FieldCatalog::load(tx, tables, kind)?;
            reconciler.reconcile(tx, tables, &declared)
        })
        .map_err(|e| KbError::runtime(format!("{} reconcile failed", kind), e))?;

    if report.is_noop() {
        log::debug!("{} reconcile: already converged", kind);
    } else {
        log::info!("Reconciled {}", report);
    }
    Ok(report)
}

/// Distinct paths currently present in a field table.
pub(crate) fn live_paths(
    conn: &Connection,
    table: &str,
    path_column: &str,
) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(&format!("SELECT DISTINCT {path_column} FROM {table}"))?;
    let paths = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(paths)
}

/// The set of declared paths.
pub(crate) fn declared_paths(declared: &[FieldDeclaration]) -> BTreeSet<String> {
    declared.iter().map(|d| d.path.clone()).collect()
}

/// Deletes every row whose path is in `paths`, `batch_size` paths per
/// statement (capped at `MAX_DELETE_BATCH_SIZE`). Returns the number of
/// rows deleted.
pub(crate) fn delete_paths<'a>(
    conn: &Connection,
    table: &str,
    path_column: &str,
    paths: impl IntoIterator<Item = &'a String>,
    batch_size: usize,
) -> Result<usize> {
    let paths: Vec<&String> = paths.into_iter().collect();
    let mut deleted = 0;
    for chunk in paths.chunks(batch_size.clamp(1, MAX_DELETE_BATCH_SIZE)) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "DELETE FROM {table} WHERE {path_column} IN ({})",
            placeholders.join(", ")
        );
        deleted += conn.execute(&sql, params_from_iter(chunk.iter()))?;
    }
    Ok(deleted)
}

/// Where a sized kind stores its rows and how they age.
pub(crate) struct Partition<'a> {
    pub table: &'a str,
    pub path_column: &'static str,
    /// Rows with the smallest value here are evicted first.
    pub age_column: &'static str,
}

impl Partition<'_> {
    pub fn count(&self, conn: &Connection, path: &str) -> Result<usize> {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1",
                self.table, self.path_column
            ),
            params![path],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    /// Deletes the `n` oldest rows of `path`.
    pub fn evict_oldest(&self, conn: &Connection, path: &str, n: usize) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {table} WHERE id IN (
                SELECT id FROM {table} WHERE {path_col} = ?1
                ORDER BY {age} ASC, id ASC LIMIT ?2
            )",
            table = self.table,
            path_col = self.path_column,
            age = self.age_column,
        );
        Ok(conn.execute(&sql, params![path, n as i64])?)
    }

    /// Brings the row count of `path` to exactly `size`. `insert` writes one
    /// placeholder row. Returns `(inserted, deleted)`.
    pub fn resize<F>(
        &self,
        conn: &Connection,
        path: &str,
        size: usize,
        insert: F,
    ) -> Result<(usize, usize)>
    where
        F: Fn(&Connection, &str) -> Result<()>,
    {
        let count = self.count(conn, path)?;
        if count > size {
            let deleted = self.evict_oldest(conn, path, count - size)?;
            return Ok((0, deleted));
        }
        for _ in count..size {
            insert(conn, path)?;
        }
        Ok((size - count, 0))
    }
}

/// Shared steps for sized kinds: drop undeclared paths, then resize every
/// declared partition.
pub(crate) fn converge_partitions<F>(
    conn: &Connection,
    kind: FieldKind,
    partition: &Partition<'_>,
    declared: &[FieldDeclaration],
    batch_size: usize,
    insert: F,
) -> Result<ReconcileReport>
where
    F: Fn(&Connection, &str) -> Result<()>,
{
    let mut report = ReconcileReport::new(kind);

    let live = live_paths(conn, partition.table, partition.path_column)?;
    let wanted = declared_paths(declared);
    let stale: Vec<&String> = live.difference(&wanted).collect();
    if !stale.is_empty() {
        log::debug!("{}: removing {} undeclared paths", kind, stale.len());
        report.deleted += delete_paths(
            conn,
            partition.table,
            partition.path_column,
            stale,
            batch_size,
        )?;
    }

    for decl in declared {
        let size = decl.size.ok_or_else(|| {
            KbError::Validation(format!("{} field '{}' has no size", kind, decl.path))
        })?;
        let (inserted, deleted) = partition.resize(conn, &decl.path, size, &insert)?;
        report.inserted += inserted;
        report.deleted += deleted;
    }

    Ok(report)
}
