use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] outpost_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Owner cannot be empty")]
    EmptyOwner,
    #[error("At least one --table is required")]
    NoTables,
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid log filter directive")]
    Logging,
}
