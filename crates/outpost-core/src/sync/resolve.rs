//! Conflict resolution

use crate::clock::{ClockOrdering, VectorClock};
use crate::error::{Error, Result};
use crate::models::{Change, Operation, RecordKey, Resolution, ResolveRequest, SyncRecord};
use crate::store::RecordStore;

use super::{PendingWrite, SyncEngine, MAX_COMMIT_ATTEMPTS};

impl<S: RecordStore> SyncEngine<S> {
    /// Finalize a conflict previously reported by [`SyncEngine::ingest`].
    ///
    /// `KeepServer` mutates nothing and returns the version the client should
    /// adopt. `KeepClient` force-applies the client's change under the merged
    /// clock of both histories, through the same locked write path as
    /// ingestion. When `expected_clock` is given and the stored clock has
    /// moved on since, this fails with [`Error::Conflict`] and must be retried
    /// against the newer version.
    pub async fn resolve(&self, owner: &str, request: ResolveRequest) -> Result<SyncRecord> {
        let key = resolve_key(owner, &request)?;

        match request.resolution {
            Resolution::KeepServer => {
                let current = self
                    .store
                    .get(&key)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("{key} has no server version")))?;
                tracing::info!(record = %key, "Conflict resolved in favour of server");
                Ok(current)
            }
            Resolution::KeepClient => {
                let change = request.change.ok_or_else(|| {
                    Error::Validation("change is required to keep the client version".into())
                })?;
                let change = Change::try_from(change)?;
                if change.table_name != key.table_name || change.record_id != key.record_id {
                    return Err(Error::Validation(format!(
                        "change targets {}/{}, not {key}",
                        change.table_name, change.record_id
                    )));
                }
                self.keep_client(key, &change, request.expected_clock.as_ref())
                    .await
            }
        }
    }

    async fn keep_client(
        &self,
        key: RecordKey,
        change: &Change,
        expected: Option<&VectorClock>,
    ) -> Result<SyncRecord> {
        let _guard = self.record_locks.lock(key.clone()).await;
        let tombstoned = change.operation == Operation::Delete;
        let payload = if tombstoned {
            None
        } else {
            change.payload.clone()
        };

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let current = self.store.get(&key).await?.ok_or_else(|| {
                Error::NotFound(format!("{key} has no server version to resolve against"))
            })?;

            if let Some(expected) = expected {
                if *expected != current.vector_clock {
                    tracing::debug!(
                        record = %key,
                        expected = %expected,
                        stored = %current.vector_clock,
                        "Server version moved on before resolution"
                    );
                    return Err(Error::Conflict(Box::new(current)));
                }
            }

            if matches!(
                change.vector_clock.compare(&current.vector_clock),
                ClockOrdering::Dominates | ClockOrdering::Equal
            ) {
                return Err(Error::NotFound(format!(
                    "no conflict pending for {key}; submit the change through ingest"
                )));
            }

            let merged = change.vector_clock.merge(&current.vector_clock);

            // Retried resolution of the same change
            if merged == current.vector_clock
                && payload == current.payload
                && tombstoned == current.tombstoned
            {
                return Ok(current);
            }

            let pending = PendingWrite {
                key: key.clone(),
                payload: payload.clone(),
                vector_clock: merged,
                tombstoned,
            };
            let Some(record) = self.commit(pending, Some(&current.vector_clock)).await? else {
                continue;
            };
            tracing::info!(
                record = %key,
                clock = %record.vector_clock,
                updated_at = record.updated_at,
                "Conflict resolved in favour of client"
            );
            return Ok(record);
        }

        Err(Error::Storage(format!(
            "{key} kept changing underneath {MAX_COMMIT_ATTEMPTS} commit attempts"
        )))
    }
}

fn resolve_key(owner: &str, request: &ResolveRequest) -> Result<RecordKey> {
    let table_name = request.table_name.trim();
    let record_id = request.record_id.trim();
    if table_name.is_empty() {
        return Err(Error::Validation("tableName is required".into()));
    }
    if record_id.is_empty() {
        return Err(Error::Validation("recordId is required".into()));
    }
    Ok(RecordKey::new(owner, table_name, record_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeRequest;
    use crate::store::MemoryRecordStore;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn change(operation: &str, payload: Option<Value>, vc: Value) -> ChangeRequest {
        let mut value = json!({
            "tableName": "contacts",
            "recordId": "r1",
            "operation": operation,
            "vectorClock": vc,
        });
        if let Some(payload) = payload {
            value["payload"] = payload;
        }
        ChangeRequest::from_value(value)
    }

    fn request(resolution: Resolution, change: Option<ChangeRequest>) -> ResolveRequest {
        ResolveRequest {
            table_name: "contacts".into(),
            record_id: "r1".into(),
            resolution,
            change,
            expected_clock: None,
        }
    }

    async fn engine_with_server_version() -> SyncEngine<MemoryRecordStore> {
        let engine = SyncEngine::open(MemoryRecordStore::new()).await.unwrap();
        let outcomes = engine
            .ingest(
                "user-1",
                vec![change("create", Some(json!({"from": "X"})), json!({"X": 1}))],
            )
            .await;
        assert!(outcomes[0].is_applied());
        engine
    }

    #[tokio::test]
    async fn test_keep_client_merges_clocks() {
        let engine = engine_with_server_version().await;
        let y_change = || change("create", Some(json!({"from": "Y"})), json!({"Y": 1}));

        let conflict = engine.ingest("user-1", vec![y_change()]).await;
        assert!(conflict[0].is_conflict());
        let before = conflict[0].record().unwrap().updated_at;

        let record = engine
            .resolve("user-1", request(Resolution::KeepClient, Some(y_change())))
            .await
            .unwrap();

        let expected: VectorClock = [("X", 1), ("Y", 1)].into_iter().collect();
        assert_eq!(record.vector_clock, expected);
        assert_eq!(record.payload, Some(json!({"from": "Y"})));
        assert!(record.updated_at > before);

        // Retrying the same resolution changes nothing
        let again = engine
            .resolve("user-1", request(Resolution::KeepClient, Some(y_change())))
            .await
            .unwrap();
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn test_keep_server_does_not_mutate() {
        let engine = engine_with_server_version().await;
        let key = RecordKey::new("user-1", "contacts", "r1");
        let before = engine.record(&key).await.unwrap().unwrap();

        let record = engine
            .resolve("user-1", request(Resolution::KeepServer, None))
            .await
            .unwrap();
        assert_eq!(record, before);
        assert_eq!(engine.record(&key).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_keep_client_detects_server_moving_on() {
        let engine = engine_with_server_version().await;
        engine
            .ingest(
                "user-1",
                vec![change("update", Some(json!({"from": "X2"})), json!({"X": 2}))],
            )
            .await;

        let mut stale = request(
            Resolution::KeepClient,
            Some(change("update", Some(json!({"from": "Y"})), json!({"Y": 1}))),
        );
        stale.expected_clock = Some([("X", 1)].into_iter().collect());

        let error = engine.resolve("user-1", stale).await.unwrap_err();
        match error {
            Error::Conflict(current) => {
                assert_eq!(current.vector_clock.get("X"), 2);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_keep_client_delete_tombstones() {
        let engine = engine_with_server_version().await;
        let record = engine
            .resolve(
                "user-1",
                request(
                    Resolution::KeepClient,
                    Some(change("delete", None, json!({"Y": 1}))),
                ),
            )
            .await
            .unwrap();
        assert!(record.tombstoned);
        assert_eq!(record.payload, None);
        assert_eq!(record.vector_clock.get("X"), 1);
        assert_eq!(record.vector_clock.get("Y"), 1);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let engine = engine_with_server_version().await;

        let missing_change = engine
            .resolve("user-1", request(Resolution::KeepClient, None))
            .await
            .unwrap_err();
        assert!(matches!(missing_change, Error::Validation(_)));

        let no_conflict = engine
            .resolve(
                "user-1",
                request(
                    Resolution::KeepClient,
                    Some(change("update", Some(json!({})), json!({"X": 2}))),
                ),
            )
            .await
            .unwrap_err();
        assert!(matches!(no_conflict, Error::NotFound(_)));

        let unknown = engine
            .resolve("user-2", request(Resolution::KeepServer, None))
            .await
            .unwrap_err();
        assert!(matches!(unknown, Error::NotFound(_)));

        let mut wrong_target = request(
            Resolution::KeepClient,
            Some(change("update", Some(json!({})), json!({"Y": 1}))),
        );
        wrong_target.record_id = "r2".into();
        let error = engine.resolve("user-1", wrong_target).await.unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }
}
