use crate::client::StoreError;
use serde::Serialize;

/// Machine-checkable failure category carried by every surfaced error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Timeout,
    StoreStatus,
    Validation,
    NotFound,
    ExhaustedRetries,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::StoreStatus => "store_status",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ExhaustedRetries => "exhausted_retries",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Transport(_) => ErrorKind::Transport,
            StoreError::Timeout(_) => ErrorKind::Timeout,
            StoreError::Status { .. } => ErrorKind::StoreStatus,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("invalid entry: {0}")]
    Validation(String),

    #[error("write to {document} failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        document: String,
        attempts: u32,
        last: StoreError,
    },
}

impl WriteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WriteError::Validation(_) => ErrorKind::Validation,
            WriteError::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
        }
    }

    /// The store error behind an exhausted write, for diagnosing store-side
    /// rejections such as size limits.
    pub fn last_store_error(&self) -> Option<&StoreError> {
        match self {
            WriteError::ExhaustedRetries { last, .. } => Some(last),
            WriteError::Validation(_) => None,
        }
    }
}
