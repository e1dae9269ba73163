use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use inksync_core::cache::NoopCache;
use inksync_core::store::LibSqlStore;
use inksync_core::{EngineConfig, StoredEntity, SyncEngine};

use crate::error::CliError;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("INKSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    PathBuf::from("inksync.db")
}

/// Open the local database and wrap it in an engine. The CLI has no shared
/// cache, so cache hooks are no-ops.
pub async fn open_engine(path: &Path) -> Result<SyncEngine, CliError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let store = LibSqlStore::open(path).await?;
    Ok(SyncEngine::new(
        Arc::new(store),
        Arc::new(NoopCache),
        EngineConfig::default(),
    ))
}

/// Read a request body from a file, or from stdin when `source` is `-`.
pub fn read_input(source: &str) -> Result<String, CliError> {
    let raw = if source == "-" {
        let mut stdin = io::stdin();
        if stdin.is_terminal() {
            return Err(CliError::EmptyInput);
        }
        let mut buffer = String::new();
        stdin.read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(source)?
    };

    if raw.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }
    Ok(raw)
}

pub fn normalize_entity_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyEntityId);
    }
    Ok(trimmed.to_string())
}

pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |time| time.to_rfc3339())
}

pub fn format_entity_lines(entity: &StoredEntity) -> Result<Vec<String>, CliError> {
    Ok(vec![
        format!("id:            {}", entity.id),
        format!(
            "last modified: {} ({})",
            format_timestamp(entity.last_modified),
            entity.last_modified
        ),
        format!("payload:       {}", serde_json::to_string(&entity.payload)?),
    ])
}
