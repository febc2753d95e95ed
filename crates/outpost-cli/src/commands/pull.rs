use std::path::Path;

use outpost_core::models::{PullRequest, PullResponse};

use crate::commands::common::{format_record_lines, normalize_owner, open_engine};
use crate::error::CliError;

pub fn build_pull_request(
    since: i64,
    tables: Vec<String>,
    device: Option<String>,
) -> Result<PullRequest, CliError> {
    if since < 0 {
        return Err(CliError::InvalidArgument(
            "--since must not be negative".to_string(),
        ));
    }
    if tables.iter().all(|table| table.trim().is_empty()) {
        return Err(CliError::NoTables);
    }
    Ok(PullRequest {
        last_sync_timestamp: since,
        tables,
        device_id: device,
    })
}

pub fn format_pull_lines(response: &PullResponse) -> Vec<String> {
    let mut lines = Vec::new();
    for (table, records) in &response.deltas {
        lines.push(format!("{table}: {} changed", records.len()));
        for record in records {
            lines.extend(
                format_record_lines(record)
                    .into_iter()
                    .map(|line| format!("  {line}")),
            );
        }
    }
    lines.push(format!("next cursor: {}", response.cursor));
    lines
}

pub async fn run_pull(
    owner: &str,
    since: i64,
    tables: Vec<String>,
    device: Option<String>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let owner = normalize_owner(owner)?;
    let request = build_pull_request(since, tables, device)?;
    let engine = open_engine(db_path).await?;
    let response = engine.pull(owner, &request).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        for line in format_pull_lines(&response) {
            println!("{line}");
        }
    }
    Ok(())
}
