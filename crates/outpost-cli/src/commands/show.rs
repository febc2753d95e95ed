use std::path::Path;

use outpost_core::RecordKey;

use crate::commands::common::{format_record_lines, normalize_owner, open_engine};
use crate::error::CliError;

pub async fn run_show(
    owner: &str,
    table: &str,
    record: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let key = RecordKey::new(normalize_owner(owner)?, table.trim(), record.trim());
    let engine = open_engine(db_path).await?;
    let current = engine
        .record(&key)
        .await?
        .ok_or_else(|| CliError::RecordNotFound(key.to_string()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&current)?);
    } else {
        for line in format_record_lines(&current) {
            println!("{line}");
        }
    }
    Ok(())
}
