use std::fmt;

use thiserror::Error;

use crate::key::KeyStructure;

/// Coarse error classification shared by every layer of the store.
///
/// Outer front-ends map these onto their own status codes: the client-side
/// kinds become rejections, the rest become internal failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed key header or wrong payload length for its structure.
    InvalidKey,
    /// Bad alphabet character, bad checksum, malformed bundle JSON.
    DecodeError,
    /// A required read missed.
    NotFound,
    /// A recomputed address disagrees with an externally asserted key.
    ConsistencyError,
    /// Filesystem or embedded database failure.
    StorageIO,
    /// Programming error on the caller side.
    InvalidArgument,
}

impl ErrorKind {
    /// `true` for kinds caused by untrusted input rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey | Self::DecodeError | Self::NotFound | Self::InvalidArgument
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidKey => "invalid_key",
            Self::DecodeError => "decode_error",
            Self::NotFound => "not_found",
            Self::ConsistencyError => "consistency_error",
            Self::StorageIO => "storage_io",
            Self::InvalidArgument => "invalid_argument",
        };
        f.write_str(s)
    }
}

/// Errors produced by codec and type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("key structure {0} is not hash based")]
    NotHashBased(KeyStructure),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl TypeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey(_) | Self::NotHashBased(_) => ErrorKind::InvalidKey,
            Self::Decode(_) | Self::InvalidLength { .. } => ErrorKind::DecodeError,
            Self::InvalidPath(_) => ErrorKind::InvalidArgument,
        }
    }
}
