//! Delta pull

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{PullRequest, PullResponse, SyncMetadata};
use crate::store::RecordStore;

use super::SyncEngine;

impl<S: RecordStore> SyncEngine<S> {
    /// Everything in the requested tables changed after the client cursor.
    ///
    /// Tombstones are included. Tables the server has never seen come back
    /// as empty sequences. No engine lock is taken, so a change committed
    /// while the pull runs may be missing here and shows up on the next pull.
    pub async fn pull(&self, owner: &str, request: &PullRequest) -> Result<PullResponse> {
        let cursor = request.last_sync_timestamp;
        let server_timestamp = self.server_timestamp();

        let mut deltas: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for table in &request.tables {
            let table = table.trim();
            if table.is_empty() || deltas.contains_key(table) {
                continue;
            }
            let records = self.store.list_updated_after(owner, table, cursor).await?;
            deltas.insert(table.to_string(), records);
        }

        let next_cursor = deltas
            .values()
            .flatten()
            .map(|record| record.updated_at)
            .fold(cursor, i64::max);

        let response = PullResponse {
            deltas,
            server_timestamp,
            cursor: next_cursor,
        };
        tracing::debug!(
            cursor,
            next_cursor,
            records = response.record_count(),
            tables = response.deltas.len(),
            "Served delta pull"
        );

        if let Some(device_id) = request
            .device_id
            .as_deref()
            .map(str::trim)
            .filter(|device| !device.is_empty())
        {
            self.record_checkpoints(owner, device_id, cursor, &response).await;
        }

        Ok(response)
    }

    /// Best effort: a failed hint write never fails the pull
    async fn record_checkpoints(
        &self,
        owner: &str,
        device_id: &str,
        cursor: i64,
        response: &PullResponse,
    ) {
        let now = chrono::Utc::now().timestamp_millis();
        for (table, records) in &response.deltas {
            let metadata = SyncMetadata {
                owner: owner.to_string(),
                device_id: device_id.to_string(),
                table_name: table.clone(),
                last_sync_timestamp: records.first().map_or(cursor, |record| record.updated_at),
                updated_at: now,
            };
            if let Err(error) = self.store.record_checkpoint(&metadata).await {
                tracing::warn!(table = table.as_str(), "Failed to record sync checkpoint: {error}");
            }
        }
    }
}
