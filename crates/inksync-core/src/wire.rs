//! JSON request/response shapes for batch submission
//!
//! The request is deserialized leniently (every field optional, ids may be
//! strings or numbers) so that [`BatchRequest::into_envelope`] can tell a
//! malformed envelope apart from a malformed item. Envelope problems reject
//! the whole batch; item problems are reported per item by the router.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{BatchResult, Provenance};
use crate::util::normalize_text_option;

/// Batch as submitted by a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<WireItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// One item of a [`BatchRequest`], before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_class: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<Value>,
}

/// Item whose id has been validated; class, payload and timestamp are
/// checked per item by the router.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeItem {
    pub id: String,
    pub entity_class: Option<String>,
    pub payload: Option<Value>,
    pub client_timestamp: Option<Value>,
}

/// Validated batch envelope
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEnvelope {
    pub provenance: Arc<Provenance>,
    pub items: Vec<EnvelopeItem>,
}

impl BatchRequest {
    /// Validate the envelope, rejecting the whole batch when it is malformed.
    pub fn into_envelope(self, max_items: usize) -> Result<BatchEnvelope> {
        let device_id = normalize_text_option(self.device_id)
            .ok_or_else(|| Error::invalid_envelope("deviceId is required"))?;
        let owner_id = normalize_text_option(self.owner_id)
            .ok_or_else(|| Error::invalid_envelope("ownerId is required"))?;

        let items = self.items.unwrap_or_default();
        if items.is_empty() {
            return Err(Error::invalid_envelope("items must be a non-empty list"));
        }
        if items.len() > max_items {
            return Err(Error::invalid_envelope(format!(
                "batch has {} items; at most {max_items} are allowed",
                items.len()
            )));
        }

        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let id = item
                    .id
                    .as_ref()
                    .and_then(item_id)
                    .ok_or_else(|| Error::invalid_envelope(format!("item {index} has no id")))?;
                Ok(EnvelopeItem {
                    id,
                    entity_class: item.entity_class.as_ref().and_then(Value::as_str).map(str::to_string),
                    payload: item.payload.filter(|payload| !payload.is_null()),
                    client_timestamp: item.client_timestamp,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchEnvelope {
            provenance: Arc::new(Provenance {
                device_id,
                owner_id,
            }),
            items,
        })
    }
}

fn item_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => normalize_text_option(Some(id.clone())),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Batch outcome returned to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(flatten)]
    pub result: BatchResult,
    /// Server Unix ms at which the result was assembled
    pub timestamp: i64,
}

impl BatchResponse {
    pub const fn new(result: BatchResult, timestamp: i64) -> Self {
        Self { result, timestamp }
    }
}
