//! Delta pull request and response

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::SyncRecord;

/// Incremental pull request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Client cursor: only records with `updatedAt` above it are returned
    #[serde(default)]
    pub last_sync_timestamp: i64,
    #[serde(default)]
    pub tables: Vec<String>,
    /// When present, a checkpoint hint is stored for this device
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Records changed since the client cursor, newest first per table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub deltas: BTreeMap<String, Vec<SyncRecord>>,
    /// Highest timestamp the server has issued so far (informational)
    pub server_timestamp: i64,
    /// Cursor to send on the next pull
    pub cursor: i64,
}

impl PullResponse {
    /// Total number of delivered records across tables
    pub fn record_count(&self) -> usize {
        self.deltas.values().map(Vec::len).sum()
    }
}
