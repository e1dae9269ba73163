//! Per-item outcomes and the partitioned batch result

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::StoredEntity;
use crate::error::Error;

/// Why an item ended up in `failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Not reconciled before the batch deadline
    Timeout,
    /// Entity class unknown or not registered
    UnsupportedType,
    /// Payload shape is wrong for the entity class
    InvalidPayload(String),
    /// Record is missing its payload or client timestamp
    InvalidRecord(String),
    /// Store failure; safe to resubmit
    PersistenceFailed(String),
    /// Fault inside the engine itself
    Internal(String),
}

impl FailureReason {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::UnsupportedType => "unsupported_type",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::InvalidRecord(_) => "invalid_record",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Timeout | Self::UnsupportedType => None,
            Self::InvalidPayload(detail)
            | Self::InvalidRecord(detail)
            | Self::PersistenceFailed(detail)
            | Self::Internal(detail) => Some(detail.as_str()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {detail}", self.code()),
            None => f.write_str(self.code()),
        }
    }
}

impl From<&Error> for FailureReason {
    fn from(error: &Error) -> Self {
        match error {
            Error::Cancelled => Self::Timeout,
            Error::InvalidPayload(detail) => Self::InvalidPayload(detail.clone()),
            Error::Store(_) | Error::Contention { .. } | Error::LibSql(_) | Error::Io(_) => {
                Self::PersistenceFailed(error.to_string())
            }
            Error::InvalidEnvelope(_) | Error::Serialization(_) | Error::Cache(_) => {
                Self::Internal(error.to_string())
            }
        }
    }
}

/// What reconciling one record produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Accepted,
    Conflict {
        server_state: StoredEntity,
        client_state: Value,
    },
    Failed(FailureReason),
}

impl ItemOutcome {
    pub const fn failed(reason: FailureReason) -> Self {
        Self::Failed(reason)
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Conflict { .. } => "conflict",
            Self::Failed(_) => "failed",
        }
    }
}

/// Outcome of the item at `index` in the submitted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub index: usize,
    pub id: String,
    pub outcome: ItemOutcome,
}

impl Resolution {
    pub fn new(index: usize, id: impl Into<String>, outcome: ItemOutcome) -> Self {
        Self {
            index,
            id: id.into(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub id: String,
    pub server_state: StoredEntity,
    pub client_state: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub id: String,
    pub reason: String,
}

/// Partitioned result of one batch. Every submitted item appears in exactly
/// one of the three lists, in submission order within each list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub accepted: Vec<String>,
    pub conflicts: Vec<ConflictEntry>,
    pub failed: Vec<FailedEntry>,
}

impl BatchResult {
    /// Partition resolutions, ordering them by submission index.
    pub fn from_resolutions(resolutions: impl IntoIterator<Item = Resolution>) -> Self {
        let mut resolutions: Vec<Resolution> = resolutions.into_iter().collect();
        resolutions.sort_by_key(|resolution| resolution.index);

        let mut result = Self::default();
        for resolution in resolutions {
            match resolution.outcome {
                ItemOutcome::Accepted => result.accepted.push(resolution.id),
                ItemOutcome::Conflict {
                    server_state,
                    client_state,
                } => result.conflicts.push(ConflictEntry {
                    id: resolution.id,
                    server_state,
                    client_state,
                }),
                ItemOutcome::Failed(reason) => result.failed.push(FailedEntry {
                    id: resolution.id,
                    reason: reason.to_string(),
                }),
            }
        }
        result
    }

    /// Number of items accounted for across all three lists
    pub fn len(&self) -> usize {
        self.accepted.len() + self.conflicts.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
