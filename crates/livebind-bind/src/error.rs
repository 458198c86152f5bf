use thiserror::Error;

use livebind_source::SourceError;
use livebind_ssr::SsrError;

/// Errors surfaced by bindings.
///
/// A binding's promise and error cell hand the same error to every
/// observer, so this type is `Clone`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("initial state error: {0}")]
    InitialState(String),
}

impl From<SsrError> for BindError {
    fn from(e: SsrError) -> Self {
        Self::InitialState(e.to_string())
    }
}

impl From<toml::de::Error> for BindError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type BindResult<T> = Result<T, BindError>;
