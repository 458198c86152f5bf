use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// What shape of data a source delivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A single value or document.
    Value,
    /// An ordered collection or query whose children arrive as structural events.
    OrderedCollection,
}

/// The family of remote service a source lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Document database (documents, collections, queries).
    Document,
    /// Keyed realtime tree (paths, ordered children).
    Keyed,
    /// Blob storage (object URLs and metadata).
    Blob,
}

/// One of the four partitions of captured initial state.
///
/// The serialized names are the single-letter codes of the transfer format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Partition {
    #[serde(rename = "f")]
    Document,
    #[serde(rename = "r")]
    Keyed,
    #[serde(rename = "s")]
    Blob,
    #[serde(rename = "u")]
    Auth,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Document,
        Partition::Keyed,
        Partition::Blob,
        Partition::Auth,
    ];

    /// The single-letter transfer code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Document => "f",
            Self::Keyed => "r",
            Self::Blob => "s",
            Self::Auth => "u",
        }
    }

    /// Parse a wire code (`f`, `r`, `s` or `u`).
    pub fn from_code(code: &str) -> Result<Self, TypeError> {
        match code {
            "f" => Ok(Self::Document),
            "r" => Ok(Self::Keyed),
            "s" => Ok(Self::Blob),
            "u" => Ok(Self::Auth),
            other => Err(TypeError::UnknownPartition(other.to_string())),
        }
    }
}

impl From<Backend> for Partition {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Document => Partition::Document,
            Backend::Keyed => Partition::Keyed,
            Backend::Blob => Partition::Blob,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Address of a remote value or ordered collection.
///
/// Immutable once created. Swapping one `SourceRef` for another is how a
/// caller asks a binding to re-subscribe.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    backend: Backend,
    kind: SourceKind,
    path: String,
}

impl SourceRef {
    /// A source with an explicit backend and kind.
    pub fn new(backend: Backend, kind: SourceKind, path: impl Into<String>) -> Self {
        Self {
            backend,
            kind,
            path: path.into(),
        }
    }

    /// A single value in the keyed realtime tree.
    pub fn keyed_value(path: impl Into<String>) -> Self {
        Self::new(Backend::Keyed, SourceKind::Value, path)
    }

    /// An ordered list of children in the keyed realtime tree.
    pub fn keyed_list(path: impl Into<String>) -> Self {
        Self::new(Backend::Keyed, SourceKind::OrderedCollection, path)
    }

    /// A single document in the document database.
    pub fn document(path: impl Into<String>) -> Self {
        Self::new(Backend::Document, SourceKind::Value, path)
    }

    /// A collection or query in the document database.
    pub fn collection(path: impl Into<String>) -> Self {
        Self::new(Backend::Document, SourceKind::OrderedCollection, path)
    }

    /// An object in blob storage.
    pub fn blob(path: impl Into<String>) -> Self {
        Self::new(Backend::Blob, SourceKind::Value, path)
    }

    /// The store this source lives in.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Single value or ordered collection.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// The address within the backend.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The initial-state partition values of this source are captured in.
    pub fn partition(&self) -> Partition {
        self.backend.into()
    }

    /// The key used for initial state when no explicit key is given.
    ///
    /// Returns `None` when the path is empty (e.g. an anonymous query).
    pub fn logical_key(&self) -> Option<&str> {
        if self.path.is_empty() {
            None
        } else {
            Some(&self.path)
        }
    }

    /// The last path segment, which the source reports as snapshot key.
    pub fn key(&self) -> Option<&str> {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|k| !k.is_empty())
    }

    /// Address of a child node, as a value source of the same backend.
    pub fn child(&self, key: &str) -> SourceRef {
        Self::new(self.backend, SourceKind::Value, join_path(&self.path, key))
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceRef({:?}:{:?} {})", self.backend, self.kind, self.path)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition(), self.path)
    }
}

/// Join a parent path and a child key with exactly one `/`.
pub fn join_path(parent: &str, key: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    if parent.is_empty() {
        format!("/{key}")
    } else {
        format!("{parent}/{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_codes_roundtrip() {
        for p in Partition::ALL {
            assert_eq!(Partition::from_code(p.code()).unwrap(), p);
        }
        assert!(Partition::from_code("x").is_err());
    }

    #[test]
    fn partition_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Partition::Keyed).unwrap(), "\"r\"");
    }

    #[test]
    fn backend_selects_partition() {
        assert_eq!(SourceRef::keyed_value("/a").partition(), Partition::Keyed);
        assert_eq!(SourceRef::collection("users").partition(), Partition::Document);
        assert_eq!(SourceRef::blob("img.png").partition(), Partition::Blob);
    }

    #[test]
    fn logical_key_is_path() {
        assert_eq!(SourceRef::keyed_value("/a/b").logical_key(), Some("/a/b"));
        assert_eq!(SourceRef::keyed_list("").logical_key(), None);
    }

    #[test]
    fn key_is_last_segment() {
        assert_eq!(SourceRef::keyed_value("/a/b").key(), Some("b"));
        assert_eq!(SourceRef::keyed_value("/a/b/").key(), Some("b"));
        assert_eq!(SourceRef::keyed_value("/").key(), None);
    }

    #[test]
    fn child_joins_path() {
        let list = SourceRef::keyed_list("/todos");
        let child = list.child("t1");
        assert_eq!(child.path(), "/todos/t1");
        assert_eq!(child.kind(), SourceKind::Value);
        assert_eq!(join_path("", "x"), "/x");
        assert_eq!(join_path("/a/", "/b"), "/a/b");
    }

    #[test]
    fn display_includes_partition() {
        assert_eq!(SourceRef::keyed_value("/a").to_string(), "r:/a");
    }
}
