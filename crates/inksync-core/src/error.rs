//! Error types for inksync-core

use thiserror::Error;

/// Result type alias using inksync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in inksync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The batch envelope is malformed; nothing in it was processed
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A record's payload does not have the shape its entity class requires
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Storage backend error
    #[error("Store error: {0}")]
    Store(String),

    /// Conditional writes kept losing the race for one entity
    #[error("Write contention on {key} after {attempts} attempts")]
    Contention { key: String, attempts: u32 },

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache backend error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Work was abandoned because the batch deadline passed
    #[error("Cancelled before commit")]
    Cancelled,
}

impl Error {
    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope(message.into())
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Whether resubmitting the same item later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Contention { .. } | Self::LibSql(_) | Self::Io(_) | Self::Cancelled
        )
    }
}
