//! Per-device sync checkpoint hints

use serde::{Deserialize, Serialize};

/// Last pull checkpoint a device reached for one table.
///
/// A convenience hint only: every pull carries its own cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub owner: String,
    pub device_id: String,
    pub table_name: String,
    /// Highest `updatedAt` delivered to the device for this table
    pub last_sync_timestamp: i64,
    /// When the hint was written (Unix ms)
    pub updated_at: i64,
}
