//! Convergence of the field tables across construction passes.

mod common;

use std::collections::BTreeSet;

use serde_json::json;

use common::TestHarness;
use kbstore::tables::{self, RpcRequest, RpcState};
use kbstore::{FieldKind, KbError};

fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_status_field_moves_from_s1_to_s2() {
    let harness = TestHarness::new();

    let b = {
        let mut b = harness.pass();
        b.add_status_field("s1", json!({}), "first", json!(null)).unwrap();
        b
    };
    b.check_installation().unwrap();
    assert_eq!(harness.live_paths(FieldKind::Status), set(&["kb1.KB_STATUS_FIELD.s1"]));
    let tables = harness.tables();
    assert_eq!(
        tables::get_status(harness.db(), &tables, "kb1.KB_STATUS_FIELD.s1").unwrap(),
        json!({})
    );

    let mut b = harness.pass();
    b.add_status_field("s2", json!({}), "second", json!(null)).unwrap();
    let reports = b.check_installation().unwrap();
    assert_eq!(reports[0].kind, FieldKind::Status);
    assert_eq!((reports[0].inserted, reports[0].deleted), (1, 1));

    assert_eq!(harness.live_paths(FieldKind::Status), set(&["kb1.KB_STATUS_FIELD.s2"]));
    assert!(matches!(
        tables::get_status(harness.db(), &tables, "kb1.KB_STATUS_FIELD.s1"),
        Err(KbError::NotFound { .. })
    ));
}

#[test]
fn test_status_data_survives_redeclaration() {
    let harness = TestHarness::new();
    let tables = harness.tables();
    let path = "kb1.KB_STATUS_FIELD.health";

    let mut b = harness.pass();
    b.add_status_field("health", json!({}), "", json!({"ok": false})).unwrap();
    b.check_installation().unwrap();
    assert_eq!(tables::get_status(harness.db(), &tables, path).unwrap(), json!({"ok": false}));

    tables::set_status(harness.db(), &tables, path, &json!({"ok": true})).unwrap();

    let mut b = harness.pass();
    b.add_status_field("health", json!({}), "", json!({"ok": false})).unwrap();
    b.check_installation().unwrap();
    assert_eq!(tables::get_status(harness.db(), &tables, path).unwrap(), json!({"ok": true}));
}

#[test]
fn test_job_queue_shrinks_oldest_first() {
    let harness = TestHarness::new();
    let path = "kb1.KB_JOB_QUEUE.work";

    let mut b = harness.pass();
    b.add_job_field("work", 3, "").unwrap();
    b.check_installation().unwrap();
    let ids = harness.row_ids(FieldKind::Job, path);
    assert_eq!(ids.len(), 3);

    // The first slot becomes the most recently completed one.
    harness.execute(&format!(
        "UPDATE plant_job SET completed_at = '2999-01-01T00:00:00.000000Z' WHERE id = {}",
        ids[0]
    ));

    let mut b = harness.pass();
    b.add_job_field("work", 1, "").unwrap();
    let job = b.reconcile_kind(FieldKind::Job).unwrap();
    assert_eq!((job.inserted, job.deleted), (0, 2));
    assert_eq!(harness.row_ids(FieldKind::Job, path), [ids[0]]);
}

#[test]
fn test_stream_grows_and_drops_undeclared_paths() {
    let harness = TestHarness::new();

    let mut b = harness.pass();
    b.add_stream_field("temps", 2, "").unwrap();
    b.add_stream_field("old", 4, "").unwrap();
    b.check_installation().unwrap();

    let mut b = harness.pass();
    b.add_stream_field("temps", 5, "").unwrap();
    let stream = b.reconcile_kind(FieldKind::Stream).unwrap();
    assert_eq!((stream.inserted, stream.deleted), (3, 4));

    assert_eq!(harness.live_paths(FieldKind::Stream), set(&["kb1.KB_STREAM_FIELD.temps"]));
    assert_eq!(harness.row_ids(FieldKind::Stream, "kb1.KB_STREAM_FIELD.temps").len(), 5);
}

#[test]
fn test_every_kind_converges_to_declared_sizes() {
    let harness = TestHarness::new();

    let mut b = harness.pass();
    b.with_header_node("site", "s1", json!({}), json!({}), "", |b| {
        b.add_status_field("health", json!({}), "", json!({}))?;
        b.add_job_field("work", 3, "")?;
        b.add_stream_field("temps", 4, "")?;
        b.add_rpc_client_field("replies", 2, "")?;
        b.add_rpc_server_field("commands", 5, "")?;
        Ok(())
    })
    .unwrap();
    b.check_installation().unwrap();

    let expected = [
        (FieldKind::Status, "kb1.site.s1.KB_STATUS_FIELD.health", 1),
        (FieldKind::Job, "kb1.site.s1.KB_JOB_QUEUE.work", 3),
        (FieldKind::Stream, "kb1.site.s1.KB_STREAM_FIELD.temps", 4),
        (FieldKind::RpcClient, "kb1.site.s1.KB_RPC_CLIENT_FIELD.replies", 2),
        (FieldKind::RpcServer, "kb1.site.s1.KB_RPC_SERVER_FIELD.commands", 5),
    ];
    for (kind, path, size) in expected {
        assert_eq!(harness.live_paths(kind), set(&[path]), "{}", kind);
        assert_eq!(harness.row_ids(kind, path).len(), size, "{}", kind);
    }
}

#[test]
fn test_second_run_is_idempotent() {
    let harness = TestHarness::new();

    let declare = || {
        let mut b = harness.pass();
        b.add_status_field("health", json!({}), "", json!({"ok": true})).unwrap();
        b.add_job_field("work", 3, "").unwrap();
        b.add_stream_field("temps", 2, "").unwrap();
        b.add_rpc_client_field("replies", 2, "").unwrap();
        b.add_rpc_server_field("commands", 2, "").unwrap();
        b
    };

    declare().check_installation().unwrap();
    let before: Vec<Vec<String>> = FieldKind::ALL.iter().map(|k| harness.snapshot(*k)).collect();

    let reports = declare().check_installation().unwrap();
    for report in &reports {
        assert!(report.is_noop(), "{}", report);
    }
    let after: Vec<Vec<String>> = FieldKind::ALL.iter().map(|k| harness.snapshot(*k)).collect();
    assert_eq!(before, after);
}

#[test]
fn test_rpc_server_slots_reset_on_reconcile() {
    let harness = TestHarness::new();
    let tables = harness.tables();
    let path = "kb1.KB_RPC_SERVER_FIELD.commands";

    let declare = || {
        let mut b = harness.pass();
        b.add_rpc_server_field("commands", 2, "").unwrap();
        b
    };
    declare().check_installation().unwrap();

    let first = tables::push_rpc_request(
        harness.db(),
        &tables,
        path,
        &RpcRequest::new("restart", json!({"unit": 3})),
    )
    .unwrap();
    tables::push_rpc_request(harness.db(), &tables, path, &RpcRequest::new("stop", json!({})))
        .unwrap();
    let claimed = tables::claim_rpc_request(harness.db(), &tables, path).unwrap().unwrap();
    assert_eq!(claimed.request_id, first);
    assert_eq!(claimed.state, RpcState::Processing);

    let reports = declare().check_installation().unwrap();
    let server = reports.iter().find(|r| r.kind == FieldKind::RpcServer).unwrap();
    assert_eq!((server.inserted, server.deleted, server.reset), (0, 0, 2));

    // Every slot is empty again and the old request id is gone.
    assert!(matches!(
        tables::complete_rpc_request(harness.db(), &tables, path, &first),
        Err(KbError::NotFound { .. })
    ));
    assert!(tables::claim_rpc_request(harness.db(), &tables, path).unwrap().is_none());
    for action in ["a", "b"] {
        tables::push_rpc_request(harness.db(), &tables, path, &RpcRequest::new(action, json!({})))
            .unwrap();
    }
}

#[test]
fn test_failed_reconcile_rolls_back() {
    let harness = TestHarness::new();

    let mut b = harness.pass();
    b.add_job_field("old", 2, "").unwrap();
    b.check_installation().unwrap();
    let before = harness.snapshot(FieldKind::Job);

    harness.execute(
        "CREATE TRIGGER block_job_insert BEFORE INSERT ON plant_job
         BEGIN SELECT RAISE(ABORT, 'inserts blocked'); END;",
    );

    let mut b = harness.pass();
    b.add_status_field("health", json!({}), "", json!({})).unwrap();
    b.add_job_field("new", 2, "").unwrap();
    b.add_stream_field("temps", 1, "").unwrap();

    let err = b.check_installation().unwrap_err();
    match &err {
        KbError::Runtime { context, source } => {
            assert!(context.contains("job"));
            assert!(source.is_some());
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
    assert!(err.to_string().contains("inserts blocked"));

    // The stale delete was rolled back with the failed inserts.
    assert_eq!(harness.snapshot(FieldKind::Job), before);
    // Status ran before the failure and committed; stream never ran.
    assert_eq!(
        harness.live_paths(FieldKind::Status),
        set(&["kb1.KB_STATUS_FIELD.health"])
    );
    assert!(harness.live_paths(FieldKind::Stream).is_empty());
}

#[test]
fn test_undeclared_kind_is_cleared_by_installation() {
    let harness = TestHarness::new();

    let mut b = harness.pass();
    b.add_rpc_client_field("replies", 3, "").unwrap();
    b.check_installation().unwrap();

    let b = harness.pass();
    assert!(matches!(
        b.reconcile_kind(FieldKind::RpcClient),
        Err(KbError::NotFound { .. })
    ));
    assert_eq!(harness.live_paths(FieldKind::RpcClient).len(), 1);

    let reports = b.check_installation().unwrap();
    let client = reports.iter().find(|r| r.kind == FieldKind::RpcClient).unwrap();
    assert_eq!(client.deleted, 3);
    assert!(harness.live_paths(FieldKind::RpcClient).is_empty());
}

#[test]
fn test_small_delete_batches() {
    let harness = TestHarness::new();
    let mut config = harness.config().clone();
    config.delete_batch_size = 2;

    let mut b = harness.pass();
    for i in 0..7 {
        b.add_status_field(&format!("s{}", i), json!({}), "", json!({})).unwrap();
    }
    b.check_installation().unwrap();

    let mut b = kbstore::HierarchyBuilder::new(harness.db().clone(), &config).unwrap();
    b.add_kb("kb1", "").unwrap();
    b.add_status_field("s3", json!({}), "", json!({})).unwrap();
    let status = b.reconcile_kind(FieldKind::Status).unwrap();
    assert_eq!(status.deleted, 6);
    assert_eq!(harness.live_paths(FieldKind::Status), set(&["kb1.KB_STATUS_FIELD.s3"]));
}
