//! Error types reported by remote sources.

use thiserror::Error;

/// A failure reported by a remote source.
///
/// Errors are delivered to every listener of the failing subscription, so
/// they are cheap to clone.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The caller is not allowed to read this location.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// The connection to the remote was lost.
    #[error("source disconnected: {0}")]
    Disconnected(String),

    /// The source address cannot be subscribed.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Any other failure reported by the remote.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Convenience type alias for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
