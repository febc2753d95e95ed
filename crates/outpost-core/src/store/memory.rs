//! In-memory record store

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::clock::VectorClock;
use crate::error::{Error, Result};
use crate::models::{RecordKey, SyncMetadata, SyncRecord};
use crate::store::RecordStore;

type MetadataKey = (String, String, String);

/// Process-local `RecordStore`, used for tests and embedded setups.
///
/// Records are cloned in and out under a short-lived lock, so readers always
/// see whole versions.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<RecordKey, SyncRecord>>,
    metadata: RwLock<BTreeMap<MetadataKey, SyncMetadata>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, tombstones included
    pub fn len(&self) -> usize {
        self.records.read().map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<SyncRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn list_updated_after(
        &self,
        owner: &str,
        table_name: &str,
        after: i64,
    ) -> Result<Vec<SyncRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut changed: Vec<SyncRecord> = records
            .values()
            .filter(|record| {
                record.owner == owner
                    && record.table_name == table_name
                    && record.updated_at > after
            })
            .cloned()
            .collect();
        changed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(changed)
    }

    async fn upsert(&self, record: &SyncRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn commit_if_unchanged(
        &self,
        record: &SyncRecord,
        expected: Option<&VectorClock>,
    ) -> Result<Option<SyncRecord>> {
        let mut records = self.records.write().map_err(poisoned)?;
        let key = record.key();
        if records.get(&key).map(|stored| &stored.vector_clock) != expected {
            return Ok(None);
        }

        let owner_high = records
            .values()
            .filter(|stored| stored.owner == record.owner)
            .map(|stored| stored.updated_at)
            .max()
            .unwrap_or(0);
        let committed = SyncRecord {
            updated_at: record.updated_at.max(owner_high.saturating_add(1)),
            ..record.clone()
        };
        records.insert(key, committed.clone());
        Ok(Some(committed))
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(records.remove(key).is_some())
    }

    async fn max_updated_at(&self) -> Result<i64> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .values()
            .map(|record| record.updated_at)
            .max()
            .unwrap_or(0))
    }

    async fn record_checkpoint(&self, metadata: &SyncMetadata) -> Result<()> {
        let key = (
            metadata.owner.clone(),
            metadata.device_id.clone(),
            metadata.table_name.clone(),
        );
        let mut entries = self.metadata.write().map_err(poisoned)?;
        entries.insert(key, metadata.clone());
        Ok(())
    }

    async fn list_metadata(&self, owner: &str) -> Result<Vec<SyncMetadata>> {
        let entries = self.metadata.read().map_err(poisoned)?;
        Ok(entries
            .values()
            .filter(|metadata| metadata.owner == owner)
            .cloned()
            .collect())
    }
}
