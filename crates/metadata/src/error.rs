//! Metadata index error types.

use thiserror::Error;

/// Metadata index operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Frame metadata failed validation; nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// The schema could not be created or is incompatible. Fatal at startup.
    #[error("schema initialization failed: {0}")]
    SchemaInit(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The caller cancelled the operation before it completed.
    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Whether the error came from the backing engine, as opposed to the
    /// caller's input or cancellation.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<forkchoice_core::Error> for MetadataError {
    fn from(err: forkchoice_core::Error) -> Self {
        match err {
            forkchoice_core::Error::Validation(msg) => Self::Validation(msg),
            forkchoice_core::Error::Config(msg) => Self::Config(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
