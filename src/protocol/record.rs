//! Transfer records relayed by activity notifications.
//!
//! The link layer does not own transfer semantics. It only needs the
//! `uuid` of each record; every other field is carried through untouched.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

// ============================================================================
// TransferRecord
// ============================================================================

/// One transfer as described by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Stable identity of the transfer across notifications.
    pub uuid: String,

    /// All other fields, opaque to this crate.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TransferRecord {
    /// Creates a record with no extra fields.
    #[inline]
    #[must_use]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field.
    #[inline]
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Gets a field by name.
    #[inline]
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

// ============================================================================
// Batch Parsing
// ============================================================================

/// Normalizes a notification payload into a batch of records.
///
/// Accepts either an array of records or an object with a `transfers`
/// array. Entries without a string `uuid` are dropped with a warning;
/// order of the remaining entries is preserved.
#[must_use]
pub fn parse_batch(payload: Value) -> Vec<TransferRecord> {
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("transfers") {
            Some(Value::Array(entries)) => entries,
            _ => {
                warn!("Activity payload without transfers array");
                return Vec::new();
            }
        },
        Value::Null => return Vec::new(),
        other => {
            warn!(payload = %other, "Unexpected activity payload");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<TransferRecord>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Dropping transfer record without uuid");
                None
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
