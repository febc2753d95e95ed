use std::path::Path;

use crate::commands::common::{format_metadata_line, normalize_owner, open_engine};
use crate::error::CliError;

pub async fn run_metadata(owner: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let metadata = engine.metadata(normalize_owner(owner)?).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    if metadata.is_empty() {
        println!("No sync checkpoints recorded.");
        return Ok(());
    }
    for entry in &metadata {
        println!("{}", format_metadata_line(entry));
    }
    Ok(())
}
