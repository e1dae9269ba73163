use std::path::PathBuf;

use clap::{Parser, Subcommand};
use inksync_core::EntityClass;

#[derive(Parser)]
#[command(name = "inksync")]
#[command(about = "Reconcile sync batches against a local inksync database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile a batch request (JSON) and print the response
    Apply {
        /// Request file, or `-` to read stdin
        #[arg(value_name = "FILE", default_value = "-")]
        input: String,
    },
    /// Show a stored entity
    Get {
        /// Entity class (appointment, customer, artist, message, analyticsFact)
        #[arg(long)]
        class: EntityClass,
        /// Entity ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove expired append-only records
    Purge,
}
