use thiserror::Error;

use livebind_types::AppId;

#[derive(Debug, Error)]
pub enum SsrError {
    #[error("no initial state registered for {0}")]
    NotInitialized(AppId),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid transfer payload: {0}")]
    InvalidPayload(String),
}

pub type SsrResult<T> = Result<T, SsrError>;
