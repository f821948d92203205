//! Application-level errors

use std::path::PathBuf;
use thiserror::Error;

/// Application errors: config, input and operation failures.
///
/// Per-record `TreeError`s are not raised here; they travel in `TreeReport.failures`.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("config error: {message}")]
    Config { message: String },

    #[error("invalid record file {path}: {message}")]
    InvalidInput { path: PathBuf, message: String },

    #[error("root record not found: {0}")]
    RootNotFound(String),

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
