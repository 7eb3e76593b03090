use binstore::{ErrorKind, StoreError, WriteError};
use hyper::StatusCode;
use thiserror::Error;

/// Result type alias for inspections operations
pub type Result<T, E = InspectionsError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum InspectionsError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectionsError {
    pub fn status(&self) -> StatusCode {
        match self {
            InspectionsError::RequestBodyError(_)
            | InspectionsError::InvalidBody(_)
            | InspectionsError::MissingParameter(_)
            | InspectionsError::Write(WriteError::Validation(_)) => StatusCode::BAD_REQUEST,
            InspectionsError::Unauthorized => StatusCode::UNAUTHORIZED,
            InspectionsError::Forbidden => StatusCode::FORBIDDEN,
            InspectionsError::NotFound => StatusCode::NOT_FOUND,
            InspectionsError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            InspectionsError::Store(StoreError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            InspectionsError::Write(WriteError::ExhaustedRetries { .. })
            | InspectionsError::Store(_) => StatusCode::BAD_GATEWAY,
            InspectionsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable category reported in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            InspectionsError::RequestBodyError(_)
            | InspectionsError::InvalidBody(_)
            | InspectionsError::MissingParameter(_) => ErrorKind::Validation.as_str(),
            InspectionsError::NotFound => ErrorKind::NotFound.as_str(),
            InspectionsError::Write(e) => e.kind().as_str(),
            InspectionsError::Store(e) => e.kind().as_str(),
            InspectionsError::Unauthorized => "unauthorized",
            InspectionsError::Forbidden => "forbidden",
            InspectionsError::MethodNotAllowed => "method_not_allowed",
            InspectionsError::Io(_) => "internal",
        }
    }
}
