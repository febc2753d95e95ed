use std::path::PathBuf;

use outpost_core::models::{ChangeRequest, Resolution};
use outpost_core::{RecordKey, RecordStore, SyncRecord, VectorClock};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::cli::KeepSide;
use crate::commands::common::{
    format_record_lines, format_sync_timestamp, normalize_owner, open_engine, resolve_db_path,
};
use crate::commands::pull::{build_pull_request, format_pull_lines};
use crate::commands::resolve::{
    build_resolve_request, parse_change, parse_expected_clock, ResolveArgs,
};
use crate::error::CliError;

fn resolve_args(keep: KeepSide, expected_clock: Option<&str>) -> ResolveArgs {
    ResolveArgs {
        owner: "user-1".to_string(),
        table: " contacts ".to_string(),
        record: "r1".to_string(),
        keep,
        change: None,
        expected_clock: expected_clock.map(ToString::to_string),
    }
}

#[test]
fn explicit_db_path_wins() {
    let path = resolve_db_path(Some(PathBuf::from("/tmp/explicit.db")));
    assert_eq!(path, PathBuf::from("/tmp/explicit.db"));
}

#[test]
fn normalize_owner_rejects_blank() {
    assert_eq!(normalize_owner("  user-1 ").unwrap(), "user-1");
    assert!(matches!(normalize_owner("  "), Err(CliError::EmptyOwner)));
}

#[test]
fn format_sync_timestamp_renders_utc() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00.000 UTC");
}

#[test]
fn record_lines_mark_tombstones() {
    let record = SyncRecord {
        owner: "user-1".to_string(),
        table_name: "contacts".to_string(),
        record_id: "r1".to_string(),
        payload: None,
        vector_clock: [("X", 2)].into_iter().collect(),
        updated_at: 5,
        tombstoned: true,
    };
    let lines = format_record_lines(&record);
    assert!(lines[0].starts_with("contacts/r1  clock {X:2}"));
    assert_eq!(lines[1], "  deleted");
}

#[test]
fn pull_request_requires_a_table() {
    assert!(matches!(
        build_pull_request(0, vec![], None),
        Err(CliError::NoTables)
    ));
    assert!(build_pull_request(-1, vec!["contacts".to_string()], None).is_err());
    let request = build_pull_request(10, vec!["contacts".to_string()], None).unwrap();
    assert_eq!(request.last_sync_timestamp, 10);
}

#[test]
fn change_document_inherits_target_from_arguments() {
    let change = parse_change(
        r#"{"operation": "update", "payload": {"n": 1}, "vectorClock": {"Y": 1}}"#,
        "contacts",
        "r1",
    )
    .unwrap();
    assert_eq!(change.table_name.as_deref(), Some("contacts"));
    assert_eq!(change.record_id.as_deref(), Some("r1"));
    assert_eq!(change.vector_clock.get("Y"), 1);

    assert!(parse_change("[1, 2]", "contacts", "r1").is_err());
}

#[test]
fn expected_clock_is_parsed_strictly() {
    let clock = parse_expected_clock(r#"{"X": 1, "Y": 3}"#).unwrap();
    let expected: VectorClock = [("X", 1), ("Y", 3)].into_iter().collect();
    assert_eq!(clock, expected);

    assert!(parse_expected_clock(r#"{"X": -1}"#).is_err());
    assert!(parse_expected_clock(r#""X""#).is_err());
}

#[test]
fn resolve_request_trims_target_and_maps_side() {
    let request =
        build_resolve_request(&resolve_args(KeepSide::Server, Some(r#"{"X":1}"#)), None).unwrap();
    assert_eq!(request.table_name, "contacts");
    assert_eq!(request.resolution, Resolution::KeepServer);
    assert_eq!(request.change, None);
    assert_eq!(request.expected_clock.unwrap().get("X"), 1);
}

#[tokio::test]
async fn resolve_keep_client_against_on_disk_store() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("outpost.db");

    {
        let engine = open_engine(&db_path).await.unwrap();
        let outcomes = engine
            .ingest(
                "user-1",
                vec![ChangeRequest::from_value(json!({
                    "tableName": "contacts",
                    "recordId": "r1",
                    "operation": "create",
                    "payload": {"from": "X"},
                    "vectorClock": {"X": 1}
                }))],
            )
            .await;
        assert!(outcomes[0].is_applied());
    }

    let args = resolve_args(KeepSide::Client, Some(r#"{"X":1}"#));
    let change = r#"{"operation": "update", "payload": {"from": "Y"}, "vectorClock": {"Y": 1}}"#;
    let request = build_resolve_request(&args, Some(change)).unwrap();

    let engine = open_engine(&db_path).await.unwrap();
    let record = engine.resolve("user-1", request).await.unwrap();
    assert_eq!(record.payload, Some(json!({"from": "Y"})));

    let stored = engine
        .record(&RecordKey::new("user-1", "contacts", "r1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, record);

    let response = engine
        .pull(
            "user-1",
            &build_pull_request(0, vec!["contacts".to_string()], None).unwrap(),
        )
        .await
        .unwrap();
    let lines = format_pull_lines(&response);
    assert_eq!(lines[0], "contacts: 1 changed");
    assert_eq!(lines.last().unwrap(), &format!("next cursor: {}", record.updated_at));
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_while_server_engine_shares_the_database() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("outpost.db");
    let cli = open_engine(&db_path).await.unwrap();
    let server = open_engine(&db_path).await.unwrap();

    let create = |id: &str, from: &str, clock: serde_json::Value| {
        ChangeRequest::from_value(json!({
            "tableName": "contacts",
            "recordId": id,
            "operation": "create",
            "payload": {"from": from},
            "vectorClock": clock
        }))
    };
    let first = server
        .ingest("user-1", vec![create("r1", "X", json!({"X": 1}))])
        .await;
    assert!(first[0].is_applied());

    // A server whose timestamps ran ahead of this process's wall clock
    let ahead = SyncRecord {
        owner: "user-1".to_string(),
        table_name: "contacts".to_string(),
        record_id: "r2".to_string(),
        payload: Some(json!({})),
        vector_clock: [("X", 1)].into_iter().collect(),
        updated_at: chrono::Utc::now().timestamp_millis() + 60_000,
        tombstoned: false,
    };
    server.store().upsert(&ahead).await.unwrap();

    let args = resolve_args(KeepSide::Client, Some(r#"{"X":1}"#));
    let change = r#"{"operation": "update", "payload": {"from": "Y"}, "vectorClock": {"Y": 1}}"#;
    let request = build_resolve_request(&args, Some(change)).unwrap();
    let resolved = cli.resolve("user-1", request).await.unwrap();
    assert!(resolved.updated_at > ahead.updated_at);

    // The server compares against the version the command line wrote
    let stale = server
        .ingest("user-1", vec![create("r1", "X again", json!({"X": 1}))])
        .await;
    assert!(stale[0].is_conflict());
    assert_eq!(stale[0].record().unwrap(), &resolved);
}
