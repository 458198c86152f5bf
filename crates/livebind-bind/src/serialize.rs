//! Turning snapshots into local values.

use livebind_types::{Record, Snapshot, Value};

/// Field holding a primitive payload in a serialized record.
pub const PRIMITIVE_FIELD: &str = "$value";

/// Converts a source snapshot into the value stored locally.
///
/// Collection bindings locate items by [`Value::id`], so a serializer used
/// for lists must give every item an id equal to the snapshot key.
pub trait Serializer: Send + Sync {
    fn serialize(&self, snapshot: &Snapshot) -> Value;
}

impl<F> Serializer for F
where
    F: Fn(&Snapshot) -> Value + Send + Sync,
{
    fn serialize(&self, snapshot: &Snapshot) -> Value {
        self(snapshot)
    }
}

/// The default serializer.
///
/// - a missing snapshot becomes `Null`
/// - a record payload is kept, with its id set to the snapshot key
/// - any other payload is wrapped as `{ "$value": payload }` with that id
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordSerializer;

impl Serializer for RecordSerializer {
    fn serialize(&self, snapshot: &Snapshot) -> Value {
        if !snapshot.exists() {
            return Value::Null;
        }
        let mut record = match snapshot.data() {
            Value::Record(record) => record.clone(),
            other => {
                let mut wrapper = Record::new();
                wrapper.insert(PRIMITIVE_FIELD, other.clone());
                wrapper
            }
        };
        record.meta.id = snapshot.key().map(str::to_string);
        Value::Record(record)
    }
}

/// Position of the item whose id is `key`.
pub fn index_for_key(items: &[Value], key: &str) -> Option<usize> {
    items.iter().position(|item| item.id() == Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_snapshot_is_null() {
        let snapshot = Snapshot::missing(Some("a".into()));
        assert_eq!(RecordSerializer.serialize(&snapshot), Value::Null);
    }

    #[test]
    fn record_payload_gets_id() {
        let snapshot = Snapshot::new(Some("ada".into()), Value::record([("name", "Ada")]));
        let value = RecordSerializer.serialize(&snapshot);
        assert_eq!(value.id(), Some("ada"));
        assert_eq!(value.get("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn primitive_payload_is_wrapped() {
        let snapshot = Snapshot::new(Some("count".into()), Value::from(3));
        let value = RecordSerializer.serialize(&snapshot);
        assert_eq!(value.id(), Some("count"));
        assert_eq!(value.get(PRIMITIVE_FIELD), Some(&Value::from(3)));
    }

    #[test]
    fn closures_are_serializers() {
        let raw = |s: &Snapshot| s.data().clone();
        let snapshot = Snapshot::new(None, Value::from("x"));
        assert_eq!(raw.serialize(&snapshot), Value::from("x"));
    }

    #[test]
    fn index_lookup_uses_ids() {
        let items: Vec<Value> = ["a", "b", "c"]
            .into_iter()
            .map(|k| RecordSerializer.serialize(&Snapshot::new(Some(k.into()), Value::from(0))))
            .collect();
        assert_eq!(index_for_key(&items, "b"), Some(1));
        assert_eq!(index_for_key(&items, "z"), None);
    }
}
