use std::env;
use std::path::{Path, PathBuf};

use outpost_core::db::{Database, LibSqlRecordStore};
use outpost_core::models::SyncMetadata;
use outpost_core::{SyncEngine, SyncRecord};

use crate::error::CliError;

pub const DEFAULT_DB_PATH: &str = "outpost.db";

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("OUTPOST_DATABASE_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

pub async fn open_engine(db_path: &Path) -> Result<SyncEngine<LibSqlRecordStore>, CliError> {
    let db = Database::open(db_path).await?;
    Ok(SyncEngine::open(LibSqlRecordStore::new(db)).await?)
}

pub fn normalize_owner(owner: &str) -> Result<&str, CliError> {
    let owner = owner.trim();
    if owner.is_empty() {
        return Err(CliError::EmptyOwner);
    }
    Ok(owner)
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
    )
}

pub fn format_record_lines(record: &SyncRecord) -> Vec<String> {
    let mut lines = vec![format!(
        "{}/{}  clock {}  updated {} ({})",
        record.table_name,
        record.record_id,
        record.vector_clock,
        format_sync_timestamp(record.updated_at),
        record.updated_at
    )];
    match &record.payload {
        _ if record.tombstoned => lines.push("  deleted".to_string()),
        Some(payload) => lines.push(format!("  {payload}")),
        None => lines.push("  (no payload)".to_string()),
    }
    lines
}

pub fn format_metadata_line(metadata: &SyncMetadata) -> String {
    format!(
        "{:<20} {:<20} cursor {}  seen {}",
        metadata.device_id,
        metadata.table_name,
        metadata.last_sync_timestamp,
        format_sync_timestamp(metadata.updated_at)
    )
}
