use crate::mapping::MappingError;
use hyper::StatusCode;
use tabstore::StoreError;
use thiserror::Error;

/// Result type alias for publish operations
pub type Result<T, E = PublishError> = std::result::Result<T, E>;

/// Everything that can stop a publish request. The `Display` text is returned
/// to the caller as the `detail` of the error response.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Missing '{0}' in payload")]
    MissingKey(String),

    #[error("Missing columns in '{tab}': {missing:?} (AUTO_ADD_COLUMNS=false)")]
    SchemaMismatch { tab: String, missing: Vec<String> },

    #[error("Key column '{column}' not found in tab '{tab}'")]
    KeyColumnMissing { tab: String, column: String },

    #[error("Invalid JSON in '{key}' string: {reason}")]
    InvalidChildListEncoding { key: String, reason: String },

    #[error("'{0}' must be a list (or JSON string)")]
    InvalidChildListType(String),

    #[error("Each process must include non-empty '{key}' (entry {index} has none)")]
    MissingChildKey { key: String, index: usize },

    #[error("{0}")]
    InvalidBody(String),

    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Mapping config error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PublishError {
    pub fn status(&self) -> StatusCode {
        match self {
            PublishError::MissingKey(_)
            | PublishError::SchemaMismatch { .. }
            | PublishError::KeyColumnMissing { .. }
            | PublishError::InvalidChildListEncoding { .. }
            | PublishError::InvalidChildListType(_)
            | PublishError::MissingChildKey { .. }
            | PublishError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            PublishError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PublishError::Mapping(_) | PublishError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short stable name, used as a metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::MissingKey(_) => "missing_key",
            PublishError::SchemaMismatch { .. } => "schema_mismatch",
            PublishError::KeyColumnMissing { .. } => "key_column_missing",
            PublishError::InvalidChildListEncoding { .. } => "invalid_child_list_encoding",
            PublishError::InvalidChildListType(_) => "invalid_child_list_type",
            PublishError::MissingChildKey { .. } => "missing_child_key",
            PublishError::InvalidBody(_) => "invalid_body",
            PublishError::BodyTooLarge(_) => "body_too_large",
            PublishError::Mapping(_) => "mapping",
            PublishError::Store(_) => "store",
        }
    }
}
