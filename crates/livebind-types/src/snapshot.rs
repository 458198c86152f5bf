use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A point-in-time payload delivered by a remote source.
///
/// Produced once per event and consumed by exactly one serializer call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    key: Option<String>,
    exists: bool,
    data: Value,
}

impl Snapshot {
    /// A snapshot of an existing node. A `Null` payload counts as absent.
    pub fn new(key: Option<String>, data: Value) -> Self {
        let exists = !data.is_null();
        Self { key, exists, data }
    }

    /// A snapshot of a node that does not exist.
    pub fn missing(key: Option<String>) -> Self {
        Self {
            key,
            exists: false,
            data: Value::Null,
        }
    }

    /// The source's intrinsic identifier for the node (last path segment).
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// `false` when nothing is stored at the address.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// The payload, `Null` when missing.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Take the payload.
    pub fn into_data(self) -> Value {
        self.data
    }
}
