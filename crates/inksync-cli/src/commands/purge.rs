use std::path::Path;

use crate::commands::common::open_engine;
use crate::error::CliError;

pub async fn run_purge(db_path: &Path) -> Result<(), CliError> {
    let removed = open_engine(db_path).await?.purge_expired().await?;
    tracing::debug!(removed, "Purged expired records");
    println!("Removed {removed} expired record(s)");
    Ok(())
}
