//! The transferable initial-state record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use livebind_types::{Partition, Value};

use crate::error::{SsrError, SsrResult};

/// Captured initial values, in four partitions keyed by logical key.
///
/// Serializes to `{"f": {..}, "r": {..}, "s": {..}, "u": {..}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SsrState {
    /// Document database values.
    #[serde(rename = "f", default)]
    pub documents: BTreeMap<String, Value>,
    /// Keyed realtime tree values.
    #[serde(rename = "r", default)]
    pub keyed: BTreeMap<String, Value>,
    /// Blob storage URLs and metadata.
    #[serde(rename = "s", default)]
    pub blobs: BTreeMap<String, Value>,
    /// Authenticated user.
    #[serde(rename = "u", default)]
    pub auth: BTreeMap<String, Value>,
}

impl SsrState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of one partition.
    pub fn partition(&self, partition: Partition) -> &BTreeMap<String, Value> {
        match partition {
            Partition::Document => &self.documents,
            Partition::Keyed => &self.keyed,
            Partition::Blob => &self.blobs,
            Partition::Auth => &self.auth,
        }
    }

    /// Mutable entries of one partition.
    pub fn partition_mut(&mut self, partition: Partition) -> &mut BTreeMap<String, Value> {
        match partition {
            Partition::Document => &mut self.documents,
            Partition::Keyed => &mut self.keyed,
            Partition::Blob => &mut self.blobs,
            Partition::Auth => &mut self.auth,
        }
    }

    /// The value captured under `key` in `partition`.
    pub fn get(&self, partition: Partition, key: &str) -> Option<&Value> {
        self.partition(partition).get(key)
    }

    /// Store a value, returning the one it replaces.
    pub fn insert(
        &mut self,
        partition: Partition,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.partition_mut(partition).insert(key.into(), value.into())
    }

    /// Total number of captured entries.
    pub fn len(&self) -> usize {
        Partition::ALL.iter().map(|p| self.partition(*p).len()).sum()
    }

    /// `true` when no partition has entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize for transfer. Lossless: typed leaves and metadata survive.
    pub fn to_json(&self) -> SsrResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a payload produced by [`to_json`](Self::to_json).
    pub fn from_json(text: &str) -> SsrResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build state from plain JSON such as `{"r": {"/a/b": 42}}`.
    ///
    /// Each partition value is converted with `Value::from`, so typed leaves
    /// and record metadata cannot be expressed. Missing partitions are empty.
    pub fn from_plain_json(json: serde_json::Value) -> SsrResult<Self> {
        let serde_json::Value::Object(partitions) = json else {
            return Err(SsrError::InvalidPayload("expected an object".into()));
        };
        let mut state = Self::new();
        for (code, entries) in partitions {
            let partition = Partition::from_code(&code)
                .map_err(|e| SsrError::InvalidPayload(e.to_string()))?;
            let serde_json::Value::Object(entries) = entries else {
                return Err(SsrError::InvalidPayload(format!(
                    "partition {code} is not an object"
                )));
            };
            for (key, value) in entries {
                state.insert(partition, key, Value::from(value));
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livebind_types::{Record, Timestamp};
    use serde_json::json;

    #[test]
    fn partitions_serialize_with_single_letter_codes() {
        let mut state = SsrState::new();
        state.insert(Partition::Keyed, "/a", 1);
        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["f", "r", "s", "u"]);
        assert!(obj["r"].get("/a").is_some());
    }

    #[test]
    fn transfer_is_lossless() {
        let mut state = SsrState::new();
        let mut record = Record::with_id("post-1", Default::default());
        record.insert("at", Timestamp::new(10, 0));
        state.insert(Partition::Document, "posts/post-1", record);
        state.insert(Partition::Auth, "user", "ada");
        let back = SsrState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(back, state);
        assert_eq!(
            back.get(Partition::Document, "posts/post-1").and_then(Value::id),
            Some("post-1")
        );
    }

    #[test]
    fn missing_partitions_default_to_empty() {
        let state = SsrState::from_json(r#"{"r": {}}"#).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn plain_json_seed() {
        let state = SsrState::from_plain_json(json!({ "r": { "/a/b": 42 } })).unwrap();
        assert_eq!(state.get(Partition::Keyed, "/a/b"), Some(&Value::Integer(42)));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn plain_json_rejects_unknown_partition() {
        assert!(SsrState::from_plain_json(json!({ "x": {} })).is_err());
        assert!(SsrState::from_plain_json(json!([1])).is_err());
        assert!(SsrState::from_plain_json(json!({ "r": 3 })).is_err());
    }
}
