//! RPC server slots and RPC client mailboxes.
//!
//! A server slot moves `empty -> new_job -> processing -> empty`; any other
//! move is refused. Client slots hold responses until they are taken.

use std::str::FromStr;

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::require_path;
use crate::db::{json_column, now_timestamp, Database, TableNames};
use crate::error::{KbError, Result};

/// State of an RPC server slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcState {
    Empty,
    NewJob,
    Processing,
}

impl RpcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcState::Empty => "empty",
            RpcState::NewJob => "new_job",
            RpcState::Processing => "processing",
        }
    }

    pub fn can_transition_to(&self, next: RpcState) -> bool {
        matches!(
            (self, next),
            (RpcState::Empty, RpcState::NewJob)
                | (RpcState::NewJob, RpcState::Processing)
                | (RpcState::Processing, RpcState::Empty)
        )
    }

    fn check(&self, next: RpcState, path: &str) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(KbError::IllegalTransition {
                path: path.to_string(),
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for RpcState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "empty" => Ok(RpcState::Empty),
            "new_job" => Ok(RpcState::NewJob),
            "processing" => Ok(RpcState::Processing),
            _ => Err(format!("Unknown RPC state: {}", s)),
        }
    }
}

/// A request placed into a server slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "default_tag")]
    pub transaction_tag: String,
    #[serde(default)]
    pub priority: i64,
    /// Client mailbox the response should go to.
    #[serde(default)]
    pub client_queue: Option<String>,
}

impl RpcRequest {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
            transaction_tag: default_tag(),
            priority: 0,
            client_queue: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_client_queue(mut self, client_path: impl Into<String>) -> Self {
        self.client_queue = Some(client_path.into());
        self
    }
}

fn default_tag() -> String {
    "none".to_string()
}

/// A row of the RPC server table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcServerSlot {
    pub id: i64,
    pub server_path: String,
    pub request_id: String,
    pub rpc_action: String,
    pub request_payload: Value,
    pub transaction_tag: String,
    pub state: RpcState,
    pub priority: i64,
    pub processing_timestamp: Option<String>,
    pub completed_timestamp: Option<String>,
    pub rpc_client_queue: Option<String>,
}

impl RpcServerSlot {
    fn from_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        let state: String = row.get("state")?;
        let state = RpcState::from_str(&state).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(Self {
            id: row.get("id")?,
            server_path: row.get("server_path")?,
            request_id: row.get("request_id")?,
            rpc_action: row.get("rpc_action")?,
            request_payload: json_column(row, "request_payload")?,
            transaction_tag: row.get("transaction_tag")?,
            state,
            priority: row.get("priority")?,
            processing_timestamp: row.get("processing_timestamp")?,
            completed_timestamp: row.get("completed_timestamp")?,
            rpc_client_queue: row.get("rpc_client_queue")?,
        })
    }
}

/// A response delivered into a client mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub server_path: String,
    pub request_id: String,
    #[serde(default = "default_tag")]
    pub transaction_tag: String,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

/// A row of the RPC client table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcClientSlot {
    pub id: i64,
    pub client_path: String,
    pub server_path: Option<String>,
    pub request_id: String,
    pub transaction_tag: String,
    pub rpc_action: String,
    pub response_payload: Value,
    pub response_timestamp: Option<String>,
    pub is_new_result: bool,
}

impl RpcClientSlot {
    fn from_row(row: &Row<'_>) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            client_path: row.get("client_path")?,
            server_path: row.get("server_path")?,
            request_id: row.get("request_id")?,
            transaction_tag: row.get("transaction_tag")?,
            rpc_action: row.get("rpc_action")?,
            response_payload: json_column(row, "response_payload")?,
            response_timestamp: row.get("response_timestamp")?,
            is_new_result: row.get("is_new_result")?,
        })
    }
}

/// Places a request into an empty server slot and returns its request id.
pub fn push_rpc_request(
    db: &Database,
    tables: &TableNames,
    server_path: &str,
    request: &RpcRequest,
) -> Result<String> {
    let table = &tables.rpc_server;
    db.with_transaction(|tx| {
        require_path(tx, table, "server_path", server_path, "rpc server field")?;
        let slot = tx
            .query_row(
                &format!(
                    "SELECT * FROM {table} WHERE server_path = ?1 AND state = 'empty'
                     ORDER BY completed_timestamp ASC, id ASC LIMIT 1"
                ),
                params![server_path],
                RpcServerSlot::from_row,
            )
            .optional()?;
        let slot = slot.ok_or_else(|| KbError::QueueFull(server_path.to_string()))?;
        slot.state.check(RpcState::NewJob, server_path)?;

        let request_id = Uuid::new_v4().to_string();
        tx.execute(
            &format!(
                "UPDATE {table} SET request_id = ?2, rpc_action = ?3, request_payload = ?4,
                 transaction_tag = ?5, priority = ?6, rpc_client_queue = ?7,
                 state = 'new_job', processing_timestamp = NULL
                 WHERE id = ?1"
            ),
            params![
                slot.id,
                request_id,
                request.action,
                request.payload.to_string(),
                request.transaction_tag,
                request.priority,
                request.client_queue,
            ],
        )?;
        log::debug!("RPC request {} queued at {}", request_id, server_path);
        Ok(request_id)
    })
}

/// Claims the highest-priority pending request, moving it to `processing`.
pub fn claim_rpc_request(
    db: &Database,
    tables: &TableNames,
    server_path: &str,
) -> Result<Option<RpcServerSlot>> {
    let table = &tables.rpc_server;
    db.with_transaction(|tx| {
        require_path(tx, table, "server_path", server_path, "rpc server field")?;
        let slot = tx
            .query_row(
                &format!(
                    "SELECT * FROM {table} WHERE server_path = ?1 AND state = 'new_job'
                     ORDER BY priority DESC, id ASC LIMIT 1"
                ),
                params![server_path],
                RpcServerSlot::from_row,
            )
            .optional()?;
        let Some(mut slot) = slot else {
            return Ok(None);
        };
        slot.state.check(RpcState::Processing, server_path)?;

        let now = now_timestamp();
        tx.execute(
            &format!(
                "UPDATE {table} SET state = 'processing', processing_timestamp = ?2 WHERE id = ?1"
            ),
            params![slot.id, now],
        )?;
        slot.state = RpcState::Processing;
        slot.processing_timestamp = Some(now);
        Ok(Some(slot))
    })
}

/// Finishes a claimed request and returns its slot to `empty`.
pub fn complete_rpc_request(
    db: &Database,
    tables: &TableNames,
    server_path: &str,
    request_id: &str,
) -> Result<()> {
    let table = &tables.rpc_server;
    db.with_transaction(|tx| {
        let slot = tx
            .query_row(
                &format!("SELECT * FROM {table} WHERE server_path = ?1 AND request_id = ?2"),
                params![server_path, request_id],
                RpcServerSlot::from_row,
            )
            .optional()?
            .ok_or_else(|| KbError::not_found("rpc request", request_id))?;
        slot.state.check(RpcState::Empty, server_path)?;

        tx.execute(
            &format!(
                "UPDATE {table} SET state = 'empty', rpc_action = 'none', request_payload = '{{}}',
                 transaction_tag = 'none', priority = 0, rpc_client_queue = NULL,
                 completed_timestamp = ?2
                 WHERE id = ?1"
            ),
            params![slot.id, now_timestamp()],
        )?;
        Ok(())
    })
}

/// Delivers a response into a free client slot.
pub fn push_rpc_response(
    db: &Database,
    tables: &TableNames,
    client_path: &str,
    response: &RpcResponse,
) -> Result<i64> {
    let table = &tables.rpc_client;
    db.with_transaction(|tx| {
        require_path(tx, table, "client_path", client_path, "rpc client field")?;
        let slot: Option<i64> = tx
            .query_row(
                &format!(
                    "SELECT id FROM {table} WHERE client_path = ?1 AND is_new_result = 0
                     ORDER BY response_timestamp ASC, id ASC LIMIT 1"
                ),
                params![client_path],
                |r| r.get(0),
            )
            .optional()?;
        let id = slot.ok_or_else(|| KbError::QueueFull(client_path.to_string()))?;
        tx.execute(
            &format!(
                "UPDATE {table} SET server_path = ?2, request_id = ?3, transaction_tag = ?4,
                 rpc_action = ?5, response_payload = ?6, response_timestamp = ?7,
                 is_new_result = 1
                 WHERE id = ?1"
            ),
            params![
                id,
                response.server_path,
                response.request_id,
                response.transaction_tag,
                response.action,
                response.payload.to_string(),
                now_timestamp(),
            ],
        )?;
        Ok(id)
    })
}

/// Takes the oldest unread response, clearing its new-result flag.
pub fn take_rpc_response(
    db: &Database,
    tables: &TableNames,
    client_path: &str,
) -> Result<Option<RpcClientSlot>> {
    let table = &tables.rpc_client;
    db.with_transaction(|tx| {
        require_path(tx, table, "client_path", client_path, "rpc client field")?;
        let slot = tx
            .query_row(
                &format!(
                    "SELECT * FROM {table} WHERE client_path = ?1 AND is_new_result = 1
                     ORDER BY response_timestamp ASC, id ASC LIMIT 1"
                ),
                params![client_path],
                RpcClientSlot::from_row,
            )
            .optional()?;
        let Some(mut slot) = slot else {
            return Ok(None);
        };
        tx.execute(
            &format!("UPDATE {table} SET is_new_result = 0 WHERE id = ?1"),
            params![slot.id],
        )?;
        slot.is_new_result = false;
        Ok(Some(slot))
    })
}
