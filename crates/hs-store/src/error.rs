use hs_crypto::CryptoError;
use hs_types::{ContentAddress, ErrorKind, TypeError};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A required read missed.
    #[error("blob not found: {0}")]
    NotFound(ContentAddress),

    /// Stored content does not match the address it was asked for.
    #[error("consistency error: expected {expected}, found {actual}")]
    Consistency { expected: String, actual: String },

    /// I/O error from the filesystem tier or the staging area.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from an embedded shard database or the staging ledger.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The writer was already committed, or failed and can no longer be used.
    #[error("content writer is closed")]
    WriterClosed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Consistency { .. } => ErrorKind::ConsistencyError,
            Self::Io(_) | Self::Database(_) => ErrorKind::StorageIO,
            Self::InvalidArgument(_) | Self::WriterClosed | Self::Config(_) => {
                ErrorKind::InvalidArgument
            }
            Self::Type(e) => e.kind(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.kind().is_client_error()
    }
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Io(e) => Self::Io(e),
            CryptoError::ZeroChunkSize => Self::InvalidArgument(err.to_string()),
        }
    }
}

impl From<StoreError> for std::io::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}
