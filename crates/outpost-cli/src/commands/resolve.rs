use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use outpost_core::models::{ChangeRequest, Resolution, ResolveRequest};
use outpost_core::VectorClock;
use serde_json::Value;

use crate::cli::KeepSide;
use crate::commands::common::{format_record_lines, normalize_owner, open_engine};
use crate::error::CliError;

pub struct ResolveArgs {
    pub owner: String,
    pub table: String,
    pub record: String,
    pub keep: KeepSide,
    pub change: Option<PathBuf>,
    pub expected_clock: Option<String>,
}

fn read_change_source(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    Ok(fs::read_to_string(path)?)
}

/// Decode a change document, filling the target from the command line when absent
pub fn parse_change(text: &str, table: &str, record: &str) -> Result<ChangeRequest, CliError> {
    let mut value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object_mut() else {
        return Err(CliError::InvalidArgument(
            "change must be a JSON object".to_string(),
        ));
    };
    object
        .entry("tableName")
        .or_insert_with(|| Value::from(table));
    object
        .entry("recordId")
        .or_insert_with(|| Value::from(record));
    Ok(ChangeRequest::from_value(value))
}

pub fn parse_expected_clock(text: &str) -> Result<VectorClock, CliError> {
    let value: Value = serde_json::from_str(text)?;
    let well_formed = value.as_object().is_some_and(|entries| {
        entries.values().all(|counter| counter.as_u64().is_some())
    });
    if !well_formed {
        return Err(CliError::InvalidArgument(
            "--expected-clock must be an object of non-negative integer counters".to_string(),
        ));
    }
    Ok(VectorClock::from_value(&value))
}

pub fn build_resolve_request(
    args: &ResolveArgs,
    change_text: Option<&str>,
) -> Result<ResolveRequest, CliError> {
    let table = args.table.trim();
    let record = args.record.trim();
    let change = change_text
        .map(|text| parse_change(text, table, record))
        .transpose()?;
    let expected_clock = args
        .expected_clock
        .as_deref()
        .map(parse_expected_clock)
        .transpose()?;

    Ok(ResolveRequest {
        table_name: table.to_string(),
        record_id: record.to_string(),
        resolution: Resolution::from(args.keep),
        change,
        expected_clock,
    })
}

pub async fn run_resolve(args: ResolveArgs, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let owner = normalize_owner(&args.owner)?.to_string();
    let change_text = args
        .change
        .as_deref()
        .map(read_change_source)
        .transpose()?;
    let request = build_resolve_request(&args, change_text.as_deref())?;

    let engine = open_engine(db_path).await?;
    let record = engine.resolve(&owner, request).await?;
    tracing::info!(record = %record.key(), "Resolved conflict from the command line");

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Conflict resolved, keeping the {} version", Resolution::from(args.keep));
        for line in format_record_lines(&record) {
            println!("{line}");
        }
    }
    Ok(())
}
