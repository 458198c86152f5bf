//! The document tree that flows from a remote source into a reactive cell.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scalar::{GeoPoint, Timestamp};

/// A typed pointer to another remote document.
///
/// A reference does not embed the data it points at; it carries only the
/// slash-separated address of the target document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    path: String,
}

impl DocumentRef {
    /// A reference to the document at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// The full address of the target document.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last path segment (the target document's id).
    pub fn id(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// The address of the collection containing the target, if any.
    pub fn parent_path(&self) -> Option<&str> {
        let trimmed = self.path.trim_end_matches('/');
        trimmed.rfind('/').map(|i| &trimmed[..i])
    }
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentRef({})", self.path)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Out-of-band metadata attached to a [`Record`].
///
/// Metadata never appears among a record's fields, so iterating or
/// exporting the fields does not see it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// The key the source assigned to the node this record was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A keyed map of fields plus metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub meta: Meta,
}

impl Record {
    /// An empty record without an id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from fields with the given source id.
    pub fn with_id(id: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            fields,
            meta: Meta {
                id: Some(id.into()),
            },
        }
    }

    /// The key the source assigned, if any.
    pub fn id(&self) -> Option<&str> {
        self.meta.id.as_deref()
    }

    /// The field named `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// `true` if the field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` when there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            meta: Meta::default(),
        }
    }
}

/// A node of a document tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(Timestamp),
    GeoPoint(GeoPoint),
    Reference(DocumentRef),
    Array(Vec<Value>),
    Record(Record),
}

impl Value {
    /// Build a record value from `(key, value)` pairs.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Record(fields.into_iter().collect())
    }

    /// Build an array value.
    pub fn array<V: Into<Value>, I: IntoIterator<Item = V>>(items: I) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// `true` for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `true` for `String`.
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// `true` for null, booleans, numbers, and strings.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_)
        )
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The numeric payload as a float, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// The items, if this is an array.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Mutable items, if this is an array.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The record, if this is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// The mutable record, if this is one.
    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// The document reference, if this is one.
    pub fn as_reference(&self) -> Option<&DocumentRef> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// The source id carried in a record's metadata.
    pub fn id(&self) -> Option<&str> {
        self.as_record().and_then(Record::id)
    }

    /// Look up a field of a record value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_record().and_then(|r| r.get(key))
    }

    /// Convert to plain JSON.
    ///
    /// Record metadata is not exported. References become their address,
    /// timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Integer(n) => J::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::String(s) => J::String(s.clone()),
            Value::Timestamp(ts) => J::String(ts.to_string()),
            Value::GeoPoint(p) => serde_json::json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
            }),
            Value::Reference(r) => J::String(r.path().to_string()),
            Value::Array(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(r) => J::Object(
                r.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::String(s),
            J::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            J::Object(map) => Value::Record(map.into_iter().collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<GeoPoint> for Value {
    fn from(p: GeoPoint) -> Self {
        Value::GeoPoint(p)
    }
}

impl From<DocumentRef> for Value {
    fn from(r: DocumentRef) -> Self {
        Value::Reference(r)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_ref_segments() {
        let r = DocumentRef::new("cities/sf/districts/mission");
        assert_eq!(r.id(), "mission");
        assert_eq!(r.parent_path(), Some("cities/sf/districts"));
        assert_eq!(DocumentRef::new("root").parent_path(), None);
    }

    #[test]
    fn json_import_maps_numbers() {
        let v = Value::from(json!({ "n": 3, "f": 1.5, "big": u64::MAX }));
        assert_eq!(v.get("n"), Some(&Value::Integer(3)));
        assert_eq!(v.get("f"), Some(&Value::Float(1.5)));
        assert!(matches!(v.get("big"), Some(Value::Float(_))));
    }

    #[test]
    fn json_export_hides_meta() {
        let mut record = Record::with_id("k1", BTreeMap::new());
        record.insert("name", "Ada");
        let v = Value::Record(record);
        assert_eq!(v.id(), Some("k1"));
        assert_eq!(v.to_json(), json!({ "name": "Ada" }));
    }

    #[test]
    fn json_export_flattens_leaves() {
        let v = Value::record([
            ("ref", Value::from(DocumentRef::new("users/1"))),
            ("at", Value::from(Timestamp::new(0, 0))),
            ("geo", Value::from(GeoPoint::new(1.0, 2.0))),
        ]);
        assert_eq!(
            v.to_json(),
            json!({
                "ref": "users/1",
                "at": "1970-01-01T00:00:00+00:00",
                "geo": { "latitude": 1.0, "longitude": 2.0 },
            })
        );
    }

    #[test]
    fn serde_roundtrip_keeps_meta() {
        let v = Value::Record(Record::with_id(
            "abc",
            [("x".to_string(), Value::Integer(1))].into_iter().collect(),
        ));
        let text = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.id(), Some("abc"));
    }

    #[test]
    fn primitive_classification() {
        assert!(Value::Null.is_primitive());
        assert!(Value::from("s").is_primitive());
        assert!(!Value::array([1, 2]).is_primitive());
        assert!(!Value::from(Timestamp::new(0, 0)).is_primitive());
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
