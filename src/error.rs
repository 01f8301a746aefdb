use std::path::PathBuf;

use thiserror::Error;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The remote endpoint was unreachable or a request against it failed.
    #[error("remote endpoint error: {0}")]
    RemoteUnavailable(String),

    /// The source collection does not exist on the endpoint.
    #[error("collection {0} does not exist - only an existing collection can be exported")]
    CollectionNotFound(String),

    /// The destination collection already exists; destinations must be created fresh.
    #[error(
        "collection {0} already exists - if you want to replace it delete it first, e.g. 'curl -XDELETE <url>/{0}'"
    )]
    CollectionAlreadyExists(String),

    /// The schema companion file for a data file is absent.
    #[error("schema file does not exist: {0}")]
    SchemaFileMissing(PathBuf),

    /// The schema definition could not be parsed into the expected shape.
    #[error("unable to parse schema: {0}")]
    SchemaParse(String),

    /// Local file open/read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job descriptor could not be resolved into a runnable transfer.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// A source/destination pairing with no transfer path.
    #[error("transfer mode {0} is not supported")]
    UnsupportedMode(&'static str),

    /// A pipeline task aborted or panicked.
    #[error("pipeline task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// The shared cancellation signal fired. Never the root cause reported to
    /// the operator; the coordinator replaces it with the first real error.
    #[error("transfer cancelled")]
    Cancelled,
}

impl From<elasticsearch::Error> for TransferError {
    fn from(err: elasticsearch::Error) -> Self {
        TransferError::RemoteUnavailable(err.to_string())
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
