//! RPC client fields: bounded response mailboxes.

use rusqlite::{params, Connection, Transaction};
use uuid::Uuid;

use super::{converge_partitions, Partition, Reconcile, ReconcileReport};
use crate::db::TableNames;
use crate::error::Result;
use crate::fields::{FieldDeclaration, FieldKind};

/// Matches slots that still carry state from an earlier cycle.
const DIRTY_SLOT: &str = "server_path IS NOT NULL
    OR transaction_tag != 'none'
    OR rpc_action != 'none'
    OR response_payload != '{}'
    OR response_timestamp IS NOT NULL
    OR is_new_result != 0";

pub struct RpcClientReconciler {
    batch_size: usize,
}

impl RpcClientReconciler {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

fn insert_slot(conn: &Connection, table: &str, path: &str) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO {table} (client_path, request_id) VALUES (?1, ?2)"),
        params![path, Uuid::new_v4().to_string()],
    )?;
    Ok(())
}

/// Returns every dirty slot to the empty mailbox state with a fresh
/// request id.
fn reset_slots(conn: &Connection, table: &str) -> Result<usize> {
    let mut stmt = conn.prepare(&format!("SELECT id FROM {table} WHERE {DIRTY_SLOT}"))?;
    let dirty = stmt
        .query_map([], |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for id in &dirty {
        conn.execute(
            &format!(
                "UPDATE {table} SET server_path = NULL, request_id = ?2,
                 transaction_tag = 'none', rpc_action = 'none', response_payload = '{{}}',
                 response_timestamp = NULL, is_new_result = 0
                 WHERE id = ?1"
            ),
            params![id, Uuid::new_v4().to_string()],
        )?;
    }
    Ok(dirty.len())
}

impl Reconcile for RpcClientReconciler {
    fn kind(&self) -> FieldKind {
        FieldKind::RpcClient
    }

    fn reconcile(
        &self,
        tx: &Transaction<'_>,
        tables: &TableNames,
        declared: &[FieldDeclaration],
    ) -> Result<ReconcileReport> {
        let table = tables.rpc_client.as_str();
        let partition = Partition {
            table,
            path_column: "client_path",
            age_column: "response_timestamp",
        };
        let mut report = converge_partitions(
            tx,
            FieldKind::RpcClient,
            &partition,
            declared,
            self.batch_size,
            |conn, path| insert_slot(conn, table, path),
        )?;
        report.reset = reset_slots(tx, table)?;
        Ok(report)
    }
}
