//! Sync engine: change ingestion, delta pull, and conflict resolution
//!
//! Mutations of one record are serialized in-process by a keyed record lock
//! held across read, compare and write. The write itself is a conditional
//! commit in the store: it lands only if the stored clock is still the one
//! that was compared, and the store stamps `updated_at` past the owner's
//! newest timestamp in the same step. Engines in other processes sharing the
//! database are therefore ordered too, and `updated_at` order matches commit
//! order for an owner, so a pull cursor never skips a later write. A commit
//! that finds the record changed is decided again against the new version.
//! Pulls take no engine locks.

mod ingest;
mod locks;
mod pull;
mod resolve;
mod timestamp;

use serde_json::Value;

use crate::clock::VectorClock;
use crate::error::Result;
use crate::models::{RecordKey, SyncMetadata, SyncRecord};
use crate::store::RecordStore;

use locks::KeyedLocks;
use timestamp::Timestamper;

/// Rounds of read, decide and conditional commit before giving up on a record
const MAX_COMMIT_ATTEMPTS: usize = 8;

/// Reconciles client changes against a [`RecordStore`]
pub struct SyncEngine<S> {
    store: S,
    record_locks: KeyedLocks<RecordKey>,
    timestamps: Timestamper,
}

/// A record version waiting for its server timestamp
#[derive(Debug, Clone)]
struct PendingWrite {
    key: RecordKey,
    payload: Option<Value>,
    vector_clock: VectorClock,
    tombstoned: bool,
}

impl PendingWrite {
    fn into_record(self, updated_at: i64) -> SyncRecord {
        SyncRecord {
            owner: self.key.owner,
            table_name: self.key.table_name,
            record_id: self.key.record_id,
            payload: if self.tombstoned { None } else { self.payload },
            vector_clock: self.vector_clock,
            updated_at,
            tombstoned: self.tombstoned,
        }
    }
}

impl<S: RecordStore> SyncEngine<S> {
    /// Create an engine whose timestamps continue above everything stored
    pub async fn open(store: S) -> Result<Self> {
        let floor = store.max_updated_at().await?;
        tracing::debug!("Sync engine timestamp floor: {floor}");
        Ok(Self {
            store,
            record_locks: KeyedLocks::new(),
            timestamps: Timestamper::new(floor),
        })
    }

    /// Underlying record store
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Highest `updated_at` issued so far
    pub fn server_timestamp(&self) -> i64 {
        self.timestamps.high_water()
    }

    /// Current server version of one record, tombstones included
    pub async fn record(&self, key: &RecordKey) -> Result<Option<SyncRecord>> {
        self.store.get(key).await
    }

    /// Checkpoint hints stored for an owner's devices
    pub async fn metadata(&self, owner: &str) -> Result<Vec<SyncMetadata>> {
        self.store.list_metadata(owner).await
    }

    /// Stamp and persist a write if the stored clock is still `expected`.
    /// Callers hold the record lock. `None` means another writer got there
    /// first and the caller must decide again.
    async fn commit(
        &self,
        pending: PendingWrite,
        expected: Option<&VectorClock>,
    ) -> Result<Option<SyncRecord>> {
        let candidate = pending.into_record(self.timestamps.issue());
        let committed = self.store.commit_if_unchanged(&candidate, expected).await?;
        if let Some(record) = &committed {
            self.timestamps.observe(record.updated_at);
        } else {
            tracing::debug!(record = %candidate.key(), "Stored version changed before commit");
        }
        Ok(committed)
    }
}
