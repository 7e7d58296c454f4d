//! Error types for recman.

use thiserror::Error;

/// Common error type for recman.
#[derive(Error, Debug)]
pub enum RecmanError {
    /// The inbound request was malformed (bad multipart data, empty filename).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The blob or record does not exist.
    #[error("{0} does not exist")]
    NotExist(String),

    /// A record-store lookup matched nothing.
    #[error("{0} not found")]
    NotFound(String),

    /// Writing the blob to the store failed.
    #[error("upload failed: {0}")]
    UploadFailure(String),

    /// The blob was still present after the delete was issued.
    #[error("deletion failed: {0}")]
    DeletionFailed(String),

    /// Reading a blob body failed.
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// Any other backend fault.
    #[error("unknown storage error: {0}")]
    Unknown(String),

    /// Database error.
    ///
    /// Errors from sqlx are converted automatically.
    #[error("database error: {0}")]
    Database(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RecmanError {
    fn from(e: sqlx::Error) -> Self {
        RecmanError::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for RecmanError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        RecmanError::Database(format!("migration failed: {e}"))
    }
}

/// Result type alias for recman operations.
pub type Result<T> = std::result::Result<T, RecmanError>;
