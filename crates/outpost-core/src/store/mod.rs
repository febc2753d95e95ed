//! Record store adapter: the narrow interface the sync engine needs from
//! the durable store

mod memory;

use std::future::Future;

use crate::clock::VectorClock;
use crate::error::Result;
use crate::models::{RecordKey, SyncMetadata, SyncRecord};

pub use memory::MemoryRecordStore;

/// Durable storage for synchronized records.
///
/// Implementations must read and write each record as one unit so a reader
/// never observes a torn record. Cross-record atomicity is not required.
///
/// Several engines, possibly in different processes, may share one durable
/// store. [`RecordStore::commit_if_unchanged`] is the only write the engine
/// issues, and it must be atomic against every other writer of the store.
pub trait RecordStore: Send + Sync {
    /// Get a record by key, including tombstones
    fn get(&self, key: &RecordKey) -> impl Future<Output = Result<Option<SyncRecord>>> + Send;

    /// Records of one owner/table with `updated_at > after`, newest first
    fn list_updated_after(
        &self,
        owner: &str,
        table_name: &str,
        after: i64,
    ) -> impl Future<Output = Result<Vec<SyncRecord>>> + Send;

    /// Insert or replace a record as given, without any version check
    fn upsert(&self, record: &SyncRecord) -> impl Future<Output = Result<()>> + Send;

    /// Write `record` if the stored version still carries `expected`.
    ///
    /// `expected` is the clock the caller read, or `None` when no row existed.
    /// In the same atomic step the store stamps `updated_at` with the larger
    /// of `record.updated_at` and one past the owner's highest stored
    /// `updated_at`. Returns the record as written, or `None` when the stored
    /// version no longer matches and nothing was written.
    fn commit_if_unchanged(
        &self,
        record: &SyncRecord,
        expected: Option<&VectorClock>,
    ) -> impl Future<Output = Result<Option<SyncRecord>>> + Send;

    /// Physically remove a record. Returns whether a row existed.
    fn delete(&self, key: &RecordKey) -> impl Future<Output = Result<bool>> + Send;

    /// Highest `updated_at` across all records, 0 when empty
    fn max_updated_at(&self) -> impl Future<Output = Result<i64>> + Send;

    /// Insert or replace a device checkpoint hint
    fn record_checkpoint(
        &self,
        metadata: &SyncMetadata,
    ) -> impl Future<Output = Result<()>> + Send;

    /// All checkpoint hints of one owner
    fn list_metadata(&self, owner: &str) -> impl Future<Output = Result<Vec<SyncMetadata>>> + Send;
}
