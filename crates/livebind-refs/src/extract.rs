use std::collections::BTreeMap;

use tracing::trace;

use livebind_types::{DocumentRef, Record, Value};

/// Dotted structural path (`"author"`, `"tags.2"`, `"meta.owner"`) to the
/// reference found there.
pub type ReferenceMap = BTreeMap<String, DocumentRef>;

/// Data of already-subscribed referenced documents, keyed by their address.
pub type ResolvedRefs = BTreeMap<String, Value>;

/// Output of [`extract_refs`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extracted {
    /// The document with every reference replaced by its address or by the
    /// previously resolved value.
    pub data: Value,
    /// Every reference found, by dotted path.
    pub refs: ReferenceMap,
}

/// Split the references out of `doc`.
///
/// - `previous` is the tree produced by the last extraction for the same
///   document, after the caller filled in resolved references. A reference
///   whose slot in `previous` holds anything other than a string keeps that
///   value instead of reverting to its address.
/// - `resolved` maps addresses to data already fetched for them. Array
///   elements whose address appears here start out with that data when the
///   array had no previous counterpart.
///
/// Record metadata and leaf values are copied through. Inputs are never
/// modified. A `doc` that is not a record is returned unchanged with no
/// references.
pub fn extract_refs(doc: &Value, previous: Option<&Value>, resolved: &ResolvedRefs) -> Extracted {
    let Value::Record(record) = doc else {
        return Extracted {
            data: doc.clone(),
            refs: ReferenceMap::new(),
        };
    };
    let mut refs = ReferenceMap::new();
    let data = extract_record(record, previous, "", resolved, &mut refs);
    trace!(refs = refs.len(), "extracted references");
    Extracted {
        data: Value::Record(data),
        refs,
    }
}

fn extract_record(
    record: &Record,
    previous: Option<&Value>,
    prefix: &str,
    resolved: &ResolvedRefs,
    refs: &mut ReferenceMap,
) -> Record {
    let previous = previous.and_then(Value::as_record);
    let fields = record
        .fields
        .iter()
        .map(|(key, value)| {
            let old = previous.and_then(|p| p.get(key));
            let path = format!("{prefix}{key}");
            let extracted = extract_value(value, old, &path, resolved, refs);
            (key.clone(), extracted)
        })
        .collect();
    Record {
        fields,
        meta: record.meta.clone(),
    }
}

fn extract_array(
    items: &[Value],
    previous: Option<&Value>,
    path: &str,
    resolved: &ResolvedRefs,
    refs: &mut ReferenceMap,
) -> Vec<Value> {
    // Slots already known from a sibling subscription stand in for a missing previous array.
    let seeded: Vec<Option<Value>>;
    let previous: Vec<Option<&Value>> = match previous.and_then(Value::as_array) {
        Some(old) => old.iter().map(Some).collect(),
        None => {
            seeded = items
                .iter()
                .map(|item| {
                    item.as_reference()
                        .and_then(|r| resolved.get(r.path()))
                        .cloned()
                })
                .collect();
            seeded.iter().map(Option::as_ref).collect()
        }
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let old = previous.get(i).copied().flatten();
            extract_value(item, old, &format!("{path}.{i}"), resolved, refs)
        })
        .collect()
}

fn extract_value(
    value: &Value,
    previous: Option<&Value>,
    path: &str,
    resolved: &ResolvedRefs,
    refs: &mut ReferenceMap,
) -> Value {
    match value {
        Value::Reference(reference) => {
            refs.insert(path.to_string(), reference.clone());
            match previous {
                // Only keep values that replaced a reference, never a stale address.
                Some(old) if !old.is_string() => old.clone(),
                _ => Value::String(reference.path().to_string()),
            }
        }
        Value::Array(items) => Value::Array(extract_array(items, previous, path, resolved, refs)),
        Value::Record(record) => Value::Record(extract_record(
            record,
            previous,
            &format!("{path}."),
            resolved,
            refs,
        )),
        leaf => leaf.clone(),
    }
}
