use std::io;

use inksync_core::EntityClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] inksync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No batch request provided")]
    EmptyInput,
    #[error("Entity ID cannot be empty")]
    EmptyEntityId,
    #[error("No {class} found with id {id}")]
    NotFound { class: EntityClass, id: String },
}
