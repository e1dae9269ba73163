//! inksync CLI - offline batch reconciliation against a local database
//!
//! Useful for replaying captured batches and inspecting stored state.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::apply::run_apply;
use crate::commands::common::resolve_db_path;
use crate::commands::get::run_get;
use crate::commands::purge::run_purge;
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
                .add_directive("inksync=info".parse().expect("valid directive"))
                .add_directive("inksync_core=warn".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Apply { input } => run_apply(&input, &db_path).await?,
        Commands::Get { class, id, json } => run_get(class, &id, json, &db_path).await?,
        Commands::Purge => run_purge(&db_path).await?,
    }

    Ok(())
}
