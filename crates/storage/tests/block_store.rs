#![forbid(unsafe_code)]

use mb_core::ids::{AgentId, UserId};
use mb_core::{Actor, BlockFields, DEFAULT_BLOCK_LIMIT};
use mb_storage::{
    BlockHistoryRequest, BulkUpdateValuesRequest, CreateBlockRequest, SqliteStore, StoreConfig,
    StoreError, UpdateBlockRequest,
};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;
use tempfile::TempDir;

const ORG: &str = "org-blocks";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_store() -> (TempDir, SqliteStore) {
    init_tracing();
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SqliteStore::open(dir.path()).expect("open store");
    (dir, store)
}

fn user() -> Actor {
    Actor::User(UserId::try_new("user-1").expect("user id"))
}

fn block_request(id: &str, value: &str, limit: Option<usize>) -> CreateBlockRequest {
    CreateBlockRequest {
        organization_id: ORG.to_string(),
        block_id: Some(id.to_string()),
        label: format!("label-{id}"),
        description: None,
        value: value.to_string(),
        limit,
        metadata: None,
        is_template: false,
        template_name: None,
        project_id: None,
        actor: user(),
        created_at_ms: None,
    }
}

#[test]
fn storage_open_is_fail_closed_on_foreign_schema() {
    init_tracing();
    let dir = tempfile::tempdir().expect("temp dir");

    let conn = Connection::open(dir.path().join("memblocks.db")).expect("raw db must open");
    conn.execute("CREATE TABLE legacy_blocks(id TEXT PRIMARY KEY)", [])
        .expect("legacy table should be created");
    drop(conn);

    let err = SqliteStore::open(dir.path()).expect_err("foreign storage must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
    assert!(matches!(
        err,
        StoreError::InvalidInput(message) if message.starts_with("RESET_REQUIRED")
    ));
}

#[test]
fn reopening_keeps_blocks_and_history() {
    init_tracing();
    let dir = tempfile::tempdir().expect("temp dir");
    {
        let mut store = SqliteStore::open(dir.path()).expect("first open");
        store
            .create_block(block_request("block-persist", "abc", Some(10)))
            .expect("create");
        store
            .checkpoint_block(BlockHistoryRequest::new(ORG, "block-persist", user()))
            .expect("checkpoint");
    }

    let store = SqliteStore::open(dir.path()).expect("second open");
    let block = store
        .get_block(ORG, "block-persist")
        .expect("get")
        .expect("block survives reopen");
    assert_eq!(block.value, "abc");
    assert!(block.current_history_id.is_some());
    assert_eq!(
        store
            .list_block_history(ORG, "block-persist")
            .expect("history")
            .len(),
        1
    );
}

#[test]
fn zero_timestamp_granularity_is_rejected() {
    init_tracing();
    let dir = tempfile::tempdir().expect("temp dir");
    let config = StoreConfig::new(dir.path()).with_timestamp_granularity_ms(0);
    let err = SqliteStore::open_with_config(config).expect_err("granularity must be >= 1");
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[test]
fn create_applies_defaults_and_truncates_oversized_values() {
    init_tracing();
    let dir = tempfile::tempdir().expect("temp dir");
    let config = StoreConfig::new(dir.path()).with_default_block_limit(4);
    let mut store = SqliteStore::open_with_config(config).expect("open store");

    let block = store
        .create_block(block_request("block-default", "abcdefgh", None))
        .expect("create");
    assert_eq!(block.limit, 4);
    assert_eq!(block.value, "abcd");
    assert_eq!(block.version, 1);
    assert_eq!(block.metadata, json!({}));
    assert!(block.current_history_id.is_none());

    let generated = store
        .create_block(CreateBlockRequest {
            block_id: None,
            ..block_request("unused", "v", Some(10))
        })
        .expect("create with generated id");
    assert!(generated.id.as_str().starts_with("block-"));
}

#[test]
fn the_stock_default_limit_applies_without_configuration() {
    let (_dir, mut store) = open_store();
    let block = store
        .create_block(block_request("block-stock", "abc", None))
        .expect("create");
    assert_eq!(block.limit, DEFAULT_BLOCK_LIMIT);
}

#[test]
fn create_rejects_empty_label_and_duplicate_id() {
    let (_dir, mut store) = open_store();
    store
        .create_block(block_request("block-dup", "abc", Some(10)))
        .expect("first create");

    let err = store
        .create_block(block_request("block-dup", "abc", Some(10)))
        .expect_err("duplicate id");
    assert!(matches!(err, StoreError::InvalidInput("block already exists")));

    let err = store
        .create_block(CreateBlockRequest {
            label: "   ".to_string(),
            ..block_request("block-nolabel", "abc", Some(10))
        })
        .expect_err("empty label");
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[test]
fn batch_create_is_all_or_nothing() {
    let (_dir, mut store) = open_store();

    let created = store
        .batch_create_blocks(vec![
            block_request("block-b1", "one", Some(10)),
            block_request("block-b2", "two", Some(10)),
        ])
        .expect("batch create");
    assert_eq!(created.len(), 2);
    assert_eq!(store.count_blocks(ORG).expect("count"), 2);

    let err = store
        .batch_create_blocks(vec![
            block_request("block-b3", "three", Some(10)),
            block_request("block-b1", "again", Some(10)),
        ])
        .expect_err("duplicate inside batch");
    assert_eq!(err.code(), "INVALID_INPUT");
    assert!(store.get_block(ORG, "block-b3").expect("get").is_none());
    assert_eq!(store.count_blocks(ORG).expect("count"), 2);

    assert!(store.batch_create_blocks(Vec::new()).expect("empty").is_empty());
}

#[test]
fn get_blocks_by_ids_is_positional() {
    let (_dir, mut store) = open_store();
    store
        .create_block(block_request("block-x", "x", Some(10)))
        .expect("create");
    store
        .create_block(block_request("block-y", "y", Some(10)))
        .expect("create");

    let found = store
        .get_blocks_by_ids(
            ORG,
            &[
                "block-y".to_string(),
                "block-missing".to_string(),
                " ".to_string(),
                "block-x".to_string(),
            ],
        )
        .expect("lookup");
    let values: Vec<Option<&str>> = found
        .iter()
        .map(|block| block.as_ref().map(|block| block.value.as_str()))
        .collect();
    assert_eq!(values, vec![Some("y"), None, None, Some("x")]);

    let foreign = store
        .get_blocks_by_ids("org-other", &["block-x".to_string()])
        .expect("lookup in other org");
    assert_eq!(foreign, vec![None]);
}

#[test]
fn update_edits_fields_and_reclamps_to_the_new_limit() {
    let (_dir, mut store) = open_store();
    store
        .create_block(block_request("block-edit", "abcdefgh", Some(20)))
        .expect("create");

    let mut request = UpdateBlockRequest::new(ORG, "block-edit", user());
    request.limit = Some(3);
    request.description = Some(Some("short".to_string()));
    request.metadata = Some(json!({"source": "test"}));
    let block = store.update_block(request).expect("update");
    assert_eq!(block.value, "abc");
    assert_eq!(block.limit, 3);
    assert_eq!(
        block.fields(),
        BlockFields {
            label: "label-block-edit".to_string(),
            description: Some("short".to_string()),
            value: "abc".to_string(),
            limit: 3,
            metadata: json!({"source": "test"}),
        }
    );
    assert_eq!(block.version, 2);

    let err = store
        .update_block(UpdateBlockRequest::new(ORG, "block-edit", user()))
        .expect_err("empty update");
    assert_eq!(err.code(), "INVALID_INPUT");

    let mut missing = UpdateBlockRequest::new(ORG, "block-missing", user());
    missing.value = Some("v".to_string());
    assert!(matches!(
        store.update_block(missing),
        Err(StoreError::NotFound { kind: "block", .. })
    ));
}

#[test]
fn bulk_update_truncates_to_limit_and_skips_unknown_ids() {
    let (_dir, mut store) = open_store();
    store
        .create_block(block_request("block-short", "", Some(5)))
        .expect("create");
    store
        .create_block(block_request("block-long", "", Some(100)))
        .expect("create");
    store
        .checkpoint_block(BlockHistoryRequest::new(ORG, "block-short", user()))
        .expect("checkpoint");

    let mut updates = BTreeMap::new();
    updates.insert("block-short".to_string(), "0123456789".to_string());
    updates.insert("block-long".to_string(), "fits".to_string());
    updates.insert("block-ghost".to_string(), "lost".to_string());

    let report = store
        .bulk_update_block_values(BulkUpdateValuesRequest {
            organization_id: ORG.to_string(),
            updates,
            actor: Actor::Agent(AgentId::try_new("agent-bulk").expect("agent id")),
        })
        .expect("bulk update");

    let updated: Vec<&str> = report.updated.iter().map(|id| id.as_str()).collect();
    assert_eq!(updated, vec!["block-long", "block-short"]);
    let truncated: Vec<&str> = report.truncated.iter().map(|id| id.as_str()).collect();
    assert_eq!(truncated, vec!["block-short"]);
    assert_eq!(report.skipped, vec!["block-ghost".to_string()]);

    let short = store
        .get_block(ORG, "block-short")
        .expect("get")
        .expect("exists");
    assert_eq!(short.value, "01234");
    assert_eq!(short.value.chars().count(), short.limit);
    assert_eq!(short.last_updated_by.as_deref(), Some("agent-bulk"));

    // Direct writes bypass history.
    let history = store
        .list_block_history(ORG, "block-short")
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].fields.value, "");
}

#[test]
fn bulk_update_with_nothing_to_do_is_empty() {
    let (_dir, mut store) = open_store();
    let report = store
        .bulk_update_block_values(BulkUpdateValuesRequest {
            organization_id: ORG.to_string(),
            updates: BTreeMap::new(),
            actor: user(),
        })
        .expect("bulk update");
    assert!(report.updated.is_empty());
    assert!(report.skipped.is_empty());
}

#[test]
fn invalid_ids_are_rejected_up_front() {
    let (_dir, mut store) = open_store();
    let err = store.get_block("-bad-org", "block-1").expect_err("bad org id");
    assert!(matches!(
        err,
        StoreError::InvalidInput("invalid organization_id")
    ));
    let err = store.get_block(ORG, "block 1").expect_err("bad block id");
    assert!(matches!(err, StoreError::InvalidInput("invalid block_id")));
    let err = store
        .checkpoint_block(BlockHistoryRequest::new(ORG, "", user()))
        .expect_err("empty block id");
    assert_eq!(err.code(), "INVALID_INPUT");
}
