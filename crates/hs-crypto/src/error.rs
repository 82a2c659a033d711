use hs_types::ErrorKind;

/// Errors from hashing and stream ingestion.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be positive")]
    ZeroChunkSize,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::StorageIO,
            Self::ZeroChunkSize => ErrorKind::InvalidArgument,
        }
    }
}
