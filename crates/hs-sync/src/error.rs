use hs_store::StoreError;
use hs_types::{ErrorKind, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A bundle does not hash to the key it was submitted under.
    #[error("consistency error: bundle submitted as {expected} hashes to {actual}")]
    Consistency { expected: String, actual: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("sync task failed: {0}")]
    Join(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Consistency { .. } => ErrorKind::ConsistencyError,
            Self::Store(e) => e.kind(),
            Self::Type(e) => e.kind(),
            Self::Join(_) => ErrorKind::StorageIO,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.kind().is_client_error()
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}
