use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("incompatible query: {0}")]
    IncompatibleQuery(String),

    #[error("reserved field name: {0}")]
    ReservedFieldName(String),

    #[error("object has no identifier; it must be saved before it can be referenced")]
    UnsavedObjectReference,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("object not found")]
    NotFound,

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}
