//! Outpost CLI - operator tool for an Outpost record store
//!
//! Works directly against the database the API server uses.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::metadata::run_metadata;
use crate::commands::pull::run_pull;
use crate::commands::resolve::{run_resolve, ResolveArgs};
use crate::commands::show::run_show;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("outpost=warn".parse().map_err(|_| CliError::Logging)?),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Show {
            owner,
            table,
            record,
            json,
        } => run_show(&owner, &table, &record, json, &db_path).await?,
        Commands::Pull {
            owner,
            since,
            tables,
            device,
            json,
        } => run_pull(&owner, since, tables, device, json, &db_path).await?,
        Commands::Resolve {
            owner,
            table,
            record,
            keep,
            change,
            expected_clock,
            json,
        } => {
            let args = ResolveArgs {
                owner,
                table,
                record,
                keep,
                change,
                expected_clock,
            };
            run_resolve(args, json, &db_path).await?;
        }
        Commands::Metadata { owner, json } => run_metadata(&owner, json, &db_path).await?,
    }

    Ok(())
}
