//! Synchronized record model

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::VectorClock;

/// Identity of one logical record: (owner, table, record id)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub owner: String,
    pub table_name: String,
    pub record_id: String,
}

impl RecordKey {
    /// Create a key from its three parts
    pub fn new(
        owner: impl Into<String>,
        table_name: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            table_name: table_name.into(),
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table_name, self.record_id)
    }
}

/// The server's authoritative state for one logical record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Owning user (partition key)
    pub owner: String,
    /// Client-defined collection name
    pub table_name: String,
    /// Identifier unique within (owner, table)
    pub record_id: String,
    /// Opaque application data, `None` once tombstoned
    pub payload: Option<Value>,
    /// Causal history that produced `payload`
    #[serde(default)]
    pub vector_clock: VectorClock,
    /// Server-assigned timestamp (Unix ms), the delta-pull cursor
    pub updated_at: i64,
    /// Deleted records are kept as tombstones so deletions propagate
    #[serde(default)]
    pub tombstoned: bool,
}

impl SyncRecord {
    /// Key of this record
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.owner, &self.table_name, &self.record_id)
    }

    /// Whether this record still carries live data
    pub const fn is_live(&self) -> bool {
        !self.tombstoned
    }
}
