use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque identity of a host application instance.
///
/// Process-wide state (the initial-state store, pending promises) is
/// partitioned by `AppId`. An identity is derived deterministically from the
/// app's name and backend configuration, so a server and a client that are
/// configured the same way agree on it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId {
    hash: [u8; 32],
}

impl AppId {
    /// Derive an `AppId` from an app name and its backend project/config label.
    pub fn derive(name: &str, project: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"livebind-app-v1:");
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(project.as_bytes());
        Self {
            hash: *hasher.finalize().as_bytes(),
        }
    }

    /// The identity of the unnamed default app for a project.
    pub fn default_for(project: &str) -> Self {
        Self::derive("[DEFAULT]", project)
    }

    /// Create an ephemeral (random) AppId for tests and demos.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self { hash: bytes }
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("app:{}", hex::encode(&self.hash[..4]))
    }

    /// Parse from a hex string (64 hex characters), with or without `app:`.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("app:").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self { hash: arr })
    }
}

impl fmt::Debug for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppId({})", self.short_id())
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}

/// Unique identifier for a live binding (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingId(uuid::Uuid);

impl BindingId {
    /// Generate a new time-ordered binding ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingId({})", self.short_id())
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = AppId::derive("web", "demo-project");
        let b = AppId::derive("web", "demo-project");
        assert_eq!(a, b);
    }

    #[test]
    fn different_names_produce_different_ids() {
        let a = AppId::derive("web", "demo-project");
        let b = AppId::derive("admin", "demo-project");
        assert_ne!(a, b);
    }

    #[test]
    fn project_changes_identity() {
        let a = AppId::derive("a", "b");
        let b = AppId::derive("a", "c");
        assert_ne!(a, b);
        assert_eq!(AppId::default_for("p"), AppId::derive("[DEFAULT]", "p"));
    }

    #[test]
    fn ephemeral_ids_are_unique() {
        assert_ne!(AppId::ephemeral(), AppId::ephemeral());
    }

    #[test]
    fn short_id_format() {
        let id = AppId::derive("web", "p");
        let short = id.short_id();
        assert!(short.starts_with("app:"));
        assert_eq!(short.len(), 12);
    }

    #[test]
    fn hex_roundtrip_with_prefix() {
        let id = AppId::derive("web", "p");
        let parsed = AppId::from_hex(&format!("app:{}", id.to_hex())).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_hex_rejects_short_input() {
        let err = AppId::from_hex("abcd").unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 32, actual: 2 });
    }

    #[test]
    fn binding_ids_are_time_ordered() {
        let a = BindingId::new();
        let b = BindingId::new();
        assert_ne!(a, b);
        assert!(a <= b);
        assert_eq!(a.short_id().len(), 8);
    }
}
