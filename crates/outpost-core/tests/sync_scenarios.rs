use std::sync::Arc;

use outpost_core::db::{Database, LibSqlRecordStore};
use outpost_core::models::{
    ChangeRequest, ConflictReason, OutcomeStatus, PullRequest, Resolution, ResolveRequest,
};
use outpost_core::{MemoryRecordStore, RecordKey, RecordStore, SyncEngine, VectorClock};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn change(
    table: &str,
    operation: &str,
    id: &str,
    payload: Option<Value>,
    clock: Value,
) -> ChangeRequest {
    let mut value = json!({
        "tableName": table,
        "operation": operation,
        "recordId": id,
        "vectorClock": clock,
        "originDevice": "device",
    });
    if let Some(payload) = payload {
        value["payload"] = payload;
    }
    ChangeRequest::from_value(value)
}

fn pull_request(cursor: i64, tables: &[&str]) -> PullRequest {
    PullRequest {
        last_sync_timestamp: cursor,
        tables: tables.iter().map(ToString::to_string).collect(),
        device_id: None,
    }
}

async fn libsql_engine() -> SyncEngine<LibSqlRecordStore> {
    let db = Database::open_in_memory().await.unwrap();
    SyncEngine::open(LibSqlRecordStore::new(db)).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_create_then_keep_client_merges_histories() {
    let engine = libsql_engine().await;
    let create = |name: &str, clock: Value| {
        change("contacts", "create", "r1", Some(json!({"name": name})), clock)
    };
    let x_create = create("from X", json!({"X": 1}));
    let y_create = create("from Y", json!({"Y": 1}));

    let x = engine.ingest("owner", vec![x_create]).await;
    assert!(x[0].is_applied());

    let y = engine.ingest("owner", vec![y_create.clone()]).await;
    match &y[0].status {
        OutcomeStatus::Conflict { reason, record } => {
            assert_eq!(*reason, ConflictReason::DuplicateCreate);
            assert_eq!(record.payload, Some(json!({"name": "from X"})));
        }
        other => panic!("expected duplicate create conflict, got {other:?}"),
    }

    let resolved = engine
        .resolve(
            "owner",
            ResolveRequest {
                table_name: "contacts".into(),
                record_id: "r1".into(),
                resolution: Resolution::KeepClient,
                change: Some(y_create),
                expected_clock: Some([("X", 1)].into_iter().collect()),
            },
        )
        .await
        .unwrap();

    let merged: VectorClock = [("X", 1), ("Y", 1)].into_iter().collect();
    assert_eq!(resolved.vector_clock, merged);
    assert_eq!(resolved.payload, Some(json!({"name": "from Y"})));

    // X's later edit built on the merged version applies cleanly
    let follow_up = engine
        .ingest(
            "owner",
            vec![change(
                "contacts",
                "update",
                "r1",
                Some(json!({"name": "X again"})),
                json!({"X": 2, "Y": 1}),
            )],
        )
        .await;
    assert!(follow_up[0].is_applied());
}

#[tokio::test(flavor = "multi_thread")]
async fn delta_pull_orders_by_submission_and_reports_untouched_tables_empty() {
    let engine = libsql_engine().await;
    let outcomes = engine
        .ingest(
            "owner",
            vec![
                change("contacts", "create", "c1", Some(json!({})), json!({"X": 1})),
                change("sos_logs", "create", "s1", Some(json!({})), json!({"X": 1})),
            ],
        )
        .await;
    let contact_at = outcomes[0].record().unwrap().updated_at;
    let log_at = outcomes[1].record().unwrap().updated_at;
    assert!(log_at > contact_at);

    let response = engine
        .pull("owner", &pull_request(0, &["contacts", "sos_logs", "first_aid"]))
        .await
        .unwrap();

    assert_eq!(response.deltas["contacts"][0].updated_at, contact_at);
    assert_eq!(response.deltas["sos_logs"][0].updated_at, log_at);
    assert!(response.deltas["first_aid"].is_empty());
    assert_eq!(response.cursor, log_at);

    let other_owner = engine
        .pull("someone-else", &pull_request(0, &["contacts"]))
        .await
        .unwrap();
    assert!(other_owner.deltas["contacts"].is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn deletion_propagates_as_tombstone_through_pull() {
    let engine = libsql_engine().await;
    let created = engine
        .ingest(
            "owner",
            vec![change("contacts", "create", "r1", Some(json!({"n": 1})), json!({"X": 1}))],
        )
        .await;
    let cursor = created[0].record().unwrap().updated_at;

    let deleted = engine
        .ingest("owner", vec![change("contacts", "delete", "r1", None, json!({"X": 2}))])
        .await;
    assert!(deleted[0].is_applied());

    let response = engine
        .pull("owner", &pull_request(cursor, &["contacts"]))
        .await
        .unwrap();
    let records = &response.deltas["contacts"];
    assert_eq!(records.len(), 1);
    assert!(records[0].tombstoned);
    assert_eq!(records[0].payload, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_reopened_on_same_store_keeps_timestamps_increasing() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("outpost.db");

    let first_at = {
        let store = LibSqlRecordStore::new(Database::open(&path).await.unwrap());
        let engine = SyncEngine::open(store).await.unwrap();
        let outcomes = engine
            .ingest(
                "owner",
                vec![change("contacts", "create", "r1", Some(json!({})), json!({"X": 1}))],
            )
            .await;
        outcomes[0].record().unwrap().updated_at
    };

    let store = LibSqlRecordStore::new(Database::open(&path).await.unwrap());
    assert_eq!(store.max_updated_at().await.unwrap(), first_at);
    let engine = SyncEngine::open(store).await.unwrap();
    let outcomes = engine
        .ingest(
            "owner",
            vec![change("contacts", "update", "r1", Some(json!({"v": 2})), json!({"X": 2}))],
        )
        .await;
    assert!(outcomes[0].record().unwrap().updated_at > first_at);
}

async fn shared_file_engines(path: &std::path::Path) -> Vec<Arc<SyncEngine<LibSqlRecordStore>>> {
    let mut engines = Vec::new();
    for _ in 0..2 {
        let store = LibSqlRecordStore::new(Database::open(path).await.unwrap());
        engines.push(Arc::new(SyncEngine::open(store).await.unwrap()));
    }
    engines
}

async fn race_concurrent_updates<S: RecordStore + 'static>(engines: Vec<Arc<SyncEngine<S>>>) {
    let engine = Arc::clone(&engines[0]);
    engine
        .ingest(
            "owner",
            vec![change("contacts", "create", "r1", Some(json!({"v": 0})), json!({"A": 1}))],
        )
        .await;

    // Every device's edit dominates the stored version, but they are
    // mutually concurrent: exactly one may win.
    let mut handles = Vec::new();
    for device in 0..16 {
        let engine = Arc::clone(&engines[device % engines.len()]);
        handles.push(tokio::spawn(async move {
            let actor = format!("D{device}");
            let mut clock = json!({"A": 1});
            clock[actor.as_str()] = json!(1);
            engine
                .ingest(
                    "owner",
                    vec![change("contacts", "update", "r1", Some(json!({"v": device})), clock)],
                )
                .await
        }));
    }

    let mut applied = 0;
    let mut conflicts = 0;
    for handle in handles {
        let outcomes = handle.await.unwrap();
        if outcomes[0].is_applied() {
            applied += 1;
        } else if outcomes[0].is_conflict() {
            conflicts += 1;
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(conflicts, 15);

    let stored = engine
        .record(&RecordKey::new("owner", "contacts", "r1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.vector_clock.get("A"), 1);
    assert_eq!(stored.vector_clock.iter().count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_record_updates_are_serialized_in_memory() {
    let engine = SyncEngine::open(MemoryRecordStore::new()).await.unwrap();
    race_concurrent_updates(vec![Arc::new(engine)]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_record_updates_are_serialized_in_libsql() {
    race_concurrent_updates(vec![Arc::new(libsql_engine().await)]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engines_sharing_one_file_serialize_same_record_updates() {
    let tmp = tempfile::tempdir().unwrap();
    let engines = shared_file_engines(&tmp.path().join("outpost.db")).await;
    race_concurrent_updates(engines).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn engines_sharing_one_file_keep_timestamps_increasing() {
    let tmp = tempfile::tempdir().unwrap();
    let engines = shared_file_engines(&tmp.path().join("outpost.db")).await;

    let mut previous = 0;
    for index in 0..200 {
        let engine = &engines[index % engines.len()];
        let outcomes = engine
            .ingest(
                "owner",
                vec![change(
                    "contacts",
                    "create",
                    &format!("r{index}"),
                    Some(json!({"i": index})),
                    json!({"X": 1}),
                )],
            )
            .await;
        let updated_at = outcomes[0].record().unwrap().updated_at;
        assert!(updated_at > previous, "commit {index} landed at {updated_at} after {previous}");
        previous = updated_at;
    }

    // Either handle's pull sees every commit, newest first
    let response = engines[1]
        .pull("owner", &pull_request(0, &["contacts"]))
        .await
        .unwrap();
    assert_eq!(response.deltas["contacts"].len(), 200);
    assert_eq!(response.cursor, previous);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingest_of_distinct_records_all_apply() {
    let engine = Arc::new(SyncEngine::open(MemoryRecordStore::new()).await.unwrap());

    let mut handles = Vec::new();
    for index in 0..32 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .ingest(
                    "owner",
                    vec![change(
                        "contacts",
                        "create",
                        &format!("r{index}"),
                        Some(json!({"i": index})),
                        json!({"X": 1}),
                    )],
                )
                .await
        }));
    }

    let mut stamps = Vec::new();
    for handle in handles {
        let outcomes = handle.await.unwrap();
        assert!(outcomes[0].is_applied());
        stamps.push(outcomes[0].record().unwrap().updated_at);
    }
    stamps.sort_unstable();
    stamps.dedup();
    assert_eq!(stamps.len(), 32);

    let response = engine
        .pull("owner", &pull_request(0, &["contacts"]))
        .await
        .unwrap();
    assert_eq!(response.deltas["contacts"].len(), 32);
    assert!(response.deltas["contacts"]
        .windows(2)
        .all(|pair| pair[0].updated_at > pair[1].updated_at));
}
