//! Per-owner analytics aggregate
//!
//! An aggregate is the field-by-field union of every fact submitted for one
//! `(factType, ownerId)` pair. Each field keeps the value with the newest
//! client timestamp; equal timestamps are broken by the canonical JSON text
//! of the value so the merge result does not depend on arrival order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Payload field naming the fact type; never merged as data.
pub const FACT_TYPE_FIELD: &str = "factType";

/// One merged field and the client time it was captured at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    pub value: Value,
    pub client_timestamp: i64,
}

impl FieldEntry {
    fn precedence(&self, other: &Self) -> Ordering {
        self.client_timestamp
            .cmp(&other.client_timestamp)
            .then_with(|| self.value.to_string().cmp(&other.value.to_string()))
    }
}

/// Stored form of a mergeable aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    pub fact_type: String,
    pub owner_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldEntry>,
}

impl AggregateState {
    pub fn new(fact_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            fact_type: fact_type.into(),
            owner_id: owner_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Storage id of the aggregate for a fact type and owner.
    ///
    /// The fact type is length-prefixed so that no two `(factType, ownerId)`
    /// pairs share an id, even when either part contains `:`.
    pub fn storage_id(fact_type: &str, owner_id: &str) -> String {
        format!("{}:{fact_type}:{owner_id}", fact_type.len())
    }

    pub fn from_payload(payload: &Value) -> Result<Self> {
        serde_json::from_value(payload.clone()).map_err(Error::from)
    }

    /// Decode a stored aggregate and check it belongs to the given key.
    pub fn load_for(payload: &Value, fact_type: &str, owner_id: &str) -> Result<Self> {
        let state = Self::from_payload(payload)?;
        if state.fact_type != fact_type || state.owner_id != owner_id {
            return Err(Error::store(format!(
                "aggregate stored under {} belongs to ({}, {})",
                Self::storage_id(fact_type, owner_id),
                state.fact_type,
                state.owner_id
            )));
        }
        Ok(state)
    }

    pub fn to_payload(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Error::from)
    }

    /// Merge one fact's fields captured at `client_timestamp`.
    ///
    /// Returns whether any field changed.
    pub fn merge_fields(&mut self, fields: &Map<String, Value>, client_timestamp: i64) -> bool {
        let mut changed = false;
        for (name, value) in fields {
            if name == FACT_TYPE_FIELD {
                continue;
            }
            changed |= self.merge_entry(
                name,
                FieldEntry {
                    value: value.clone(),
                    client_timestamp,
                },
            );
        }
        changed
    }

    /// Merge another aggregate for the same key into this one.
    pub fn merge(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (name, entry) in &other.fields {
            changed |= self.merge_entry(name, entry.clone());
        }
        changed
    }

    fn merge_entry(&mut self, name: &str, candidate: FieldEntry) -> bool {
        match self.fields.get_mut(name) {
            Some(existing) => {
                if candidate.precedence(existing) == Ordering::Greater {
                    *existing = candidate;
                    true
                } else {
                    false
                }
            }
            None => {
                self.fields.insert(name.to_string(), candidate);
                true
            }
        }
    }
}

/// Read the fact type from a submitted payload.
pub fn fact_type_of(payload: &Value) -> Result<(&str, &Map<String, Value>)> {
    let fields = payload
        .as_object()
        .ok_or_else(|| Error::invalid_payload("analytics payload must be an object"))?;
    let fact_type = fields
        .get(FACT_TYPE_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|fact_type| !fact_type.is_empty())
        .ok_or_else(|| Error::invalid_payload("analytics payload is missing `factType`"))?;
    Ok((fact_type, fields))
}
