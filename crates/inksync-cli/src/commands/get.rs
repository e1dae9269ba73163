use std::path::Path;

use inksync_core::models::EntityKey;
use inksync_core::store::EntityStore;
use inksync_core::{EntityClass, StoredEntity};

use crate::commands::common::{format_entity_lines, normalize_entity_id, open_engine};
use crate::error::CliError;

pub async fn run_get(
    class: EntityClass,
    id: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let entity = fetch_entity(class, id, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entity)?);
    } else {
        for line in format_entity_lines(&entity)? {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn fetch_entity(
    class: EntityClass,
    id: &str,
    db_path: &Path,
) -> Result<StoredEntity, CliError> {
    let id = normalize_entity_id(id)?;
    let engine = open_engine(db_path).await?;
    engine
        .store()
        .get(&EntityKey::new(class, id.clone()))
        .await?
        .ok_or(CliError::NotFound { class, id })
}
