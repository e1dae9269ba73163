use std::path::Path;

use inksync_core::{BatchRequest, BatchResponse};

use crate::commands::common::{open_engine, read_input};
use crate::error::CliError;

pub async fn run_apply(input: &str, db_path: &Path) -> Result<(), CliError> {
    let raw = read_input(input)?;
    let response = apply_request(&raw, db_path).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub async fn apply_request(raw: &str, db_path: &Path) -> Result<BatchResponse, CliError> {
    let request: BatchRequest = serde_json::from_str(raw)?;
    let engine = open_engine(db_path).await?;
    Ok(engine.submit(request).await?)
}
