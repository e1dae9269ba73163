//! Sync records and stored entities

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::EntityClass;

/// Who submitted a batch. Supplied by the transport layer, never read from
/// record payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub device_id: String,
    pub owner_id: String,
}

/// One client-proposed change
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    /// Caller-assigned id, unique within `entity_class`
    pub id: String,
    pub entity_class: EntityClass,
    /// Class-specific document
    pub payload: Value,
    /// Unix ms at which the client captured the state it submits
    pub client_timestamp: i64,
    pub provenance: Arc<Provenance>,
}

impl SyncRecord {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_class, self.id.clone())
    }

    pub fn owner_id(&self) -> &str {
        &self.provenance.owner_id
    }

    pub fn device_id(&self) -> &str {
        &self.provenance.device_id
    }
}

/// Server-held state of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntity {
    pub id: String,
    pub payload: Value,
    /// Server stamp (Unix ms) of the last accepted write
    pub last_modified: i64,
}

/// Address of one stored entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub class: EntityClass,
    pub id: String,
}

impl EntityKey {
    pub fn new(class: EntityClass, id: impl Into<String>) -> Self {
        Self {
            class,
            id: id.into(),
        }
    }

    /// Key under which the cache holds this entity
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.id)
    }
}
