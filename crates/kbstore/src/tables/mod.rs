//! Runtime operations on the reconciled field tables.
//!
//! These are the calls collaborators use once construction is done: read
//! and write status slots, push and consume queue entries, and drive RPC
//! slots through their state machine. Each call addresses a declared field
//! path and fails with `NotFound` when the table holds no rows for it.

use rusqlite::{params, Connection};

use crate::error::{KbError, Result};

pub mod queue;
pub mod rpc;
pub mod status;

pub use queue::{
    complete_job, count_jobs, peek_job, push_job, push_stream, read_stream, QueueEntry,
};
pub use rpc::{
    claim_rpc_request, complete_rpc_request, push_rpc_request, push_rpc_response,
    take_rpc_response, RpcClientSlot, RpcRequest, RpcResponse, RpcServerSlot, RpcState,
};
pub use status::{get_status, set_status};

/// Fails with `NotFound` unless `table` has at least one row at `path`.
pub(crate) fn require_path(
    conn: &Connection,
    table: &str,
    path_column: &str,
    path: &str,
    kind: &'static str,
) -> Result<()> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {path_column} = ?1"),
        params![path],
        |r| r.get(0),
    )?;
    if count == 0 {
        return Err(KbError::not_found(kind, path));
    }
    Ok(())
}
