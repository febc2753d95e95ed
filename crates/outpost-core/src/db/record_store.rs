//! libSQL implementation of `RecordStore`

use libsql::{params, Connection, Row, Value};
use tokio::sync::Mutex;

use crate::clock::VectorClock;
use crate::db::Database;
use crate::error::Result;
use crate::models::{RecordKey, SyncMetadata, SyncRecord};
use crate::store::RecordStore;

const RECORD_COLUMNS: &str =
    "owner, table_name, record_id, payload, vector_clock, updated_at, tombstoned";

/// `RecordStore` over the `sync_records` / `sync_metadata` tables.
///
/// Statements on the shared connection are serialized, so a read never runs
/// inside another task's open write transaction. Conditional commits run in
/// a `BEGIN IMMEDIATE` transaction, which also orders them against writers
/// in other processes using the same database file.
pub struct LibSqlRecordStore {
    db: Database,
    access: Mutex<()>,
}

impl LibSqlRecordStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            access: Mutex::new(()),
        }
    }

    /// Underlying database handle
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Parse a record from a database row
    fn parse_record(row: &Row) -> Result<SyncRecord> {
        let payload = match row.get_value(3)? {
            Value::Text(text) => Some(serde_json::from_str(&text)?),
            Value::Null => None,
            other => {
                return Err(crate::Error::Database(format!(
                    "unexpected payload column type: {other:?}"
                )))
            }
        };
        let clock: String = row.get(4)?;

        Ok(SyncRecord {
            owner: row.get(0)?,
            table_name: row.get(1)?,
            record_id: row.get(2)?,
            payload,
            vector_clock: VectorClock::from_json_str(&clock),
            updated_at: row.get(5)?,
            tombstoned: row.get::<i64>(6)? != 0,
        })
    }

    fn parse_metadata(row: &Row) -> Result<SyncMetadata> {
        Ok(SyncMetadata {
            owner: row.get(0)?,
            device_id: row.get(1)?,
            table_name: row.get(2)?,
            last_sync_timestamp: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    async fn write_record(conn: &Connection, record: &SyncRecord) -> Result<()> {
        let payload = match &record.payload {
            Some(payload) => Value::Text(serde_json::to_string(payload)?),
            None => Value::Null,
        };

        conn.execute(
            "INSERT INTO sync_records (owner, table_name, record_id, payload, vector_clock, updated_at, tombstoned)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner, table_name, record_id) DO UPDATE SET
                 payload = excluded.payload,
                 vector_clock = excluded.vector_clock,
                 updated_at = excluded.updated_at,
                 tombstoned = excluded.tombstoned",
            params![
                record.owner.as_str(),
                record.table_name.as_str(),
                record.record_id.as_str(),
                payload,
                record.vector_clock.to_json_string(),
                record.updated_at,
                i64::from(record.tombstoned)
            ],
        )
        .await?;
        Ok(())
    }

    /// Check-and-write body of `commit_if_unchanged`. Runs inside the caller's
    /// transaction.
    async fn stamp_and_write(
        conn: &Connection,
        record: &SyncRecord,
        expected: Option<&VectorClock>,
    ) -> Result<Option<SyncRecord>> {
        let mut rows = conn
            .query(
                "SELECT vector_clock FROM sync_records
                 WHERE owner = ? AND table_name = ? AND record_id = ?",
                params![
                    record.owner.as_str(),
                    record.table_name.as_str(),
                    record.record_id.as_str()
                ],
            )
            .await?;
        let stored = match rows.next().await? {
            Some(row) => Some(VectorClock::from_json_str(&row.get::<String>(0)?)),
            None => None,
        };
        if stored.as_ref() != expected {
            return Ok(None);
        }

        let mut rows = conn
            .query(
                "SELECT COALESCE(MAX(updated_at), 0) FROM sync_records WHERE owner = ?",
                params![record.owner.as_str()],
            )
            .await?;
        let owner_high: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        let committed = SyncRecord {
            updated_at: record.updated_at.max(owner_high.saturating_add(1)),
            ..record.clone()
        };
        Self::write_record(conn, &committed).await?;
        Ok(Some(committed))
    }
}

impl RecordStore for LibSqlRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<SyncRecord>> {
        let _access = self.access.lock().await;
        let mut rows = self
            .db
            .connection()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sync_records
                     WHERE owner = ? AND table_name = ? AND record_id = ?"
                ),
                params![
                    key.owner.as_str(),
                    key.table_name.as_str(),
                    key.record_id.as_str()
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_updated_after(
        &self,
        owner: &str,
        table_name: &str,
        after: i64,
    ) -> Result<Vec<SyncRecord>> {
        let _access = self.access.lock().await;
        let mut rows = self
            .db
            .connection()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sync_records
                     WHERE owner = ? AND table_name = ? AND updated_at > ?
                     ORDER BY updated_at DESC"
                ),
                params![owner, table_name, after],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn upsert(&self, record: &SyncRecord) -> Result<()> {
        let _access = self.access.lock().await;
        Self::write_record(self.db.connection(), record).await
    }

    async fn commit_if_unchanged(
        &self,
        record: &SyncRecord,
        expected: Option<&VectorClock>,
    ) -> Result<Option<SyncRecord>> {
        let _access = self.access.lock().await;
        let conn = self.db.connection();
        conn.execute("BEGIN IMMEDIATE", ()).await?;

        match Self::stamp_and_write(conn, record, expected).await {
            Ok(Some(committed)) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(Some(committed))
            }
            Ok(None) => {
                conn.execute("ROLLBACK", ()).await?;
                Ok(None)
            }
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool> {
        let _access = self.access.lock().await;
        let rows = self
            .db
            .connection()
            .execute(
                "DELETE FROM sync_records WHERE owner = ? AND table_name = ? AND record_id = ?",
                params![
                    key.owner.as_str(),
                    key.table_name.as_str(),
                    key.record_id.as_str()
                ],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn max_updated_at(&self) -> Result<i64> {
        let _access = self.access.lock().await;
        let mut rows = self
            .db
            .connection()
            .query("SELECT COALESCE(MAX(updated_at), 0) FROM sync_records", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    async fn record_checkpoint(&self, metadata: &SyncMetadata) -> Result<()> {
        let _access = self.access.lock().await;
        self.db
            .connection()
            .execute(
                "INSERT INTO sync_metadata (owner, device_id, table_name, last_sync_timestamp, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(owner, device_id, table_name) DO UPDATE SET
                     last_sync_timestamp = excluded.last_sync_timestamp,
                     updated_at = excluded.updated_at",
                params![
                    metadata.owner.as_str(),
                    metadata.device_id.as_str(),
                    metadata.table_name.as_str(),
                    metadata.last_sync_timestamp,
                    metadata.updated_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_metadata(&self, owner: &str) -> Result<Vec<SyncMetadata>> {
        let _access = self.access.lock().await;
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT owner, device_id, table_name, last_sync_timestamp, updated_at
                 FROM sync_metadata
                 WHERE owner = ?
                 ORDER BY device_id ASC, table_name ASC",
                params![owner],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_metadata(&row)?);
        }
        Ok(entries)
    }
}
