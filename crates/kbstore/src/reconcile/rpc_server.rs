//! RPC server fields: bounded request slots.
//!
//! Reconciliation forces every slot back to `empty`, including slots
//! holding `new_job` or `processing` work.

use rusqlite::{params, Connection, Transaction};
use uuid::Uuid;

use super::{converge_partitions, Partition, Reconcile, ReconcileReport};
use crate::db::TableNames;
use crate::error::Result;
use crate::fields::{FieldDeclaration, FieldKind};

const DIRTY_SLOT: &str = "state != 'empty'
    OR rpc_action != 'none'
    OR request_payload != '{}'
    OR transaction_tag != 'none'
    OR priority != 0
    OR processing_timestamp IS NOT NULL
    OR completed_timestamp IS NOT NULL
    OR rpc_client_queue IS NOT NULL";

pub struct RpcServerReconciler {
    batch_size: usize,
}

impl RpcServerReconciler {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

fn insert_slot(conn: &Connection, table: &str, path: &str) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO {table} (server_path, request_id) VALUES (?1, ?2)"),
        params![path, Uuid::new_v4().to_string()],
    )?;
    Ok(())
}

fn reset_slots(conn: &Connection, table: &str) -> Result<usize> {
    let mut stmt = conn.prepare(&format!("SELECT id, state FROM {table} WHERE {DIRTY_SLOT}"))?;
    let dirty = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let discarded = dirty.iter().filter(|(_, state)| state != "empty").count();
    if discarded > 0 {
        log::warn!("Discarding {} in-flight RPC requests in {}", discarded, table);
    }

    for (id, _) in &dirty {
        conn.execute(
            &format!(
                "UPDATE {table} SET request_id = ?2, rpc_action = 'none',
                 request_payload = '{{}}', transaction_tag = 'none', state = 'empty',
                 priority = 0, processing_timestamp = NULL, completed_timestamp = NULL,
                 rpc_client_queue = NULL
                 WHERE id = ?1"
            ),
            params![id, Uuid::new_v4().to_string()],
        )?;
    }
    Ok(dirty.len())
}

impl Reconcile for RpcServerReconciler {
    fn kind(&self) -> FieldKind {
        FieldKind::RpcServer
    }

    fn reconcile(
        &self,
        tx: &Transaction<'_>,
        tables: &TableNames,
        declared: &[FieldDeclaration],
    ) -> Result<ReconcileReport> {
        let table = tables.rpc_server.as_str();
        let partition = Partition {
            table,
            path_column: "server_path",
            age_column: "completed_timestamp",
        };
        let mut report = converge_partitions(
            tx,
            FieldKind::RpcServer,
            &partition,
            declared,
            self.batch_size,
            |conn, path| insert_slot(conn, table, path),
        )?;
        report.reset = reset_slots(tx, table)?;
        Ok(report)
    }
}
