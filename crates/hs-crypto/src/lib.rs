//! Content hashing for the hash store.
//!
//! Provides the streaming SHA-256 hasher every write goes through, and the
//! single-pass ingestion routine that yields a digest, a length and, for
//! small inputs, the bytes themselves so they can be inlined into a key.
//!
//! All hashing wraps `sha2`. No custom cryptography.

pub mod error;
pub mod hasher;
pub mod ingest;

pub use error::{CryptoError, CryptoResult};
pub use hasher::{quick_hash, verify, ContentHasher};
pub use ingest::{
    process_stream, process_stream_with, KeyFromReader, StreamSummary, DEFAULT_CHUNK_SIZE,
};
