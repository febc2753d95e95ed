//! Change ingestion (outbox application)

use crate::clock::{ClockOrdering, VectorClock};
use crate::error::{Error, Result};
use crate::models::{
    Change, ChangeOutcome, ChangeRequest, ConflictReason, FailureKind, Operation, RecordKey,
    SyncRecord,
};
use crate::store::RecordStore;

use super::{PendingWrite, SyncEngine, MAX_COMMIT_ATTEMPTS};

/// What to do with one change given the stored version
#[derive(Debug)]
enum Decision {
    Write(PendingWrite),
    Noop(SyncRecord),
    Conflict(ConflictReason, SyncRecord),
    NotFound,
}

fn write(key: RecordKey, change: &Change) -> Decision {
    let tombstoned = change.operation == Operation::Delete;
    Decision::Write(PendingWrite {
        key,
        payload: if tombstoned {
            None
        } else {
            change.payload.clone()
        },
        vector_clock: change.vector_clock.clone(),
        tombstoned,
    })
}

fn decide(key: RecordKey, change: &Change, current: Option<&SyncRecord>) -> Decision {
    let submitted = &change.vector_clock;

    match (change.operation, current) {
        (Operation::Create, None) => write(key, change),
        (Operation::Create, Some(record)) if record.is_live() => {
            if submitted.compare(&record.vector_clock) == ClockOrdering::Equal {
                Decision::Noop(record.clone())
            } else {
                Decision::Conflict(ConflictReason::DuplicateCreate, record.clone())
            }
        }
        (_, None) => {
            if submitted.dominates(&VectorClock::new()) {
                write(key, change)
            } else {
                Decision::NotFound
            }
        }
        // Tombstones take part in the comparison like any other version
        (operation, Some(record)) => match submitted.compare(&record.vector_clock) {
            ClockOrdering::Dominates => write(key, change),
            // An equal clock is a retry only if it would leave the same liveness
            ClockOrdering::Equal if record.tombstoned != (operation == Operation::Delete) => {
                Decision::Conflict(ConflictReason::Stale, record.clone())
            }
            ClockOrdering::Equal => Decision::Noop(record.clone()),
            ClockOrdering::Concurrent => {
                Decision::Conflict(ConflictReason::Concurrent, record.clone())
            }
            ClockOrdering::Dominated => Decision::Conflict(ConflictReason::Stale, record.clone()),
        },
    }
}

impl<S: RecordStore> SyncEngine<S> {
    /// Apply a batch of client changes in submission order.
    ///
    /// Each change gets its own outcome; a conflicted or failed change never
    /// stops the rest of the batch.
    pub async fn ingest(&self, owner: &str, changes: Vec<ChangeRequest>) -> Vec<ChangeOutcome> {
        let mut outcomes = Vec::with_capacity(changes.len());
        for (index, request) in changes.into_iter().enumerate() {
            outcomes.push(self.ingest_one(owner, index, request).await);
        }

        let applied = outcomes.iter().filter(|o| o.is_applied()).count();
        let conflicts = outcomes.iter().filter(|o| o.is_conflict()).count();
        let errors = outcomes.iter().filter(|o| o.is_error()).count();
        tracing::info!(
            changes = outcomes.len(),
            applied,
            conflicts,
            errors,
            "Ingested change batch"
        );
        outcomes
    }

    async fn ingest_one(
        &self,
        owner: &str,
        index: usize,
        request: ChangeRequest,
    ) -> ChangeOutcome {
        let record_id = request.record_id.clone();
        let operation = request
            .operation
            .as_deref()
            .and_then(|operation| operation.parse::<Operation>().ok());

        let change = match Change::try_from(request) {
            Ok(change) => change,
            Err(error) => {
                tracing::debug!(index, "Rejected malformed change: {error}");
                return ChangeOutcome::failure(
                    index,
                    record_id,
                    operation,
                    FailureKind::Validation,
                    error.to_string(),
                );
            }
        };

        match self.apply_change(owner, index, &change).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(
                    index,
                    table = change.table_name.as_str(),
                    record = change.record_id.as_str(),
                    "Storage failure while ingesting change: {error}"
                );
                ChangeOutcome::failure(
                    index,
                    Some(change.record_id.clone()),
                    Some(change.operation),
                    FailureKind::Storage,
                    error.to_string(),
                )
            }
        }
    }

    async fn apply_change(
        &self,
        owner: &str,
        index: usize,
        change: &Change,
    ) -> Result<ChangeOutcome> {
        let key = change.key(owner);
        let _guard = self.record_locks.lock(key.clone()).await;

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let current = self.store.get(&key).await?;
            let expected = current.as_ref().map(|record| &record.vector_clock);

            let outcome = match decide(key.clone(), change, current.as_ref()) {
                Decision::Write(pending) => {
                    let Some(record) = self.commit(pending, expected).await? else {
                        continue;
                    };
                    tracing::debug!(
                        index,
                        record = %key,
                        clock = %record.vector_clock,
                        updated_at = record.updated_at,
                        "Applied {}",
                        change.operation
                    );
                    ChangeOutcome::applied(index, change.operation, record, false)
                }
                Decision::Noop(record) => {
                    tracing::debug!(index, record = %key, "Change already applied");
                    ChangeOutcome::applied(index, change.operation, record, true)
                }
                Decision::Conflict(reason, record) => {
                    tracing::debug!(
                        index,
                        record = %key,
                        submitted = %change.vector_clock,
                        stored = %record.vector_clock,
                        ?reason,
                        "Change conflicts with server version"
                    );
                    ChangeOutcome::conflict(index, change.operation, reason, record)
                }
                Decision::NotFound => ChangeOutcome::failure(
                    index,
                    Some(change.record_id.clone()),
                    Some(change.operation),
                    FailureKind::NotFound,
                    format!("{key} does not exist and the clock does not dominate empty history"),
                ),
            };
            return Ok(outcome);
        }

        Err(Error::Storage(format!(
            "{key} kept changing underneath {MAX_COMMIT_ATTEMPTS} commit attempts"
        )))
    }
}
