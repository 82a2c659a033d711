//! Single-pass stream ingestion.
//!
//! Reads a stream to the end once, producing its digest and length, and
//! keeps the bytes only while they could still be inlined into a key.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use hs_types::{InlinePolicy, Key, Role, DIGEST_LEN};

use crate::error::{CryptoError, CryptoResult};
use crate::hasher::ContentHasher;

/// Default read size for stream ingestion.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Result of reading a stream to the end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSummary {
    pub digest: [u8; DIGEST_LEN],
    pub length: u64,
    /// The full content, when it fits under the inline limit.
    pub inline_candidate: Option<Vec<u8>>,
}

impl StreamSummary {
    /// Key for the ingested content.
    pub fn key(&self, role: Role) -> Key {
        Key::from_digest_and_inline_data(self.digest, self.inline_candidate.as_deref(), role)
    }
}

/// Read `reader` to EOF under the default inline policy.
pub fn process_stream<R: Read>(reader: R, chunk_size: usize) -> CryptoResult<StreamSummary> {
    process_stream_with(reader, chunk_size, &InlinePolicy::default(), |_| {})
}

/// Read `reader` to EOF, calling `on_chunk` with every chunk read.
///
/// The inline candidate is dropped as soon as the running length passes
/// `policy.max_inline` and is not picked up again.
pub fn process_stream_with<R, F>(
    mut reader: R,
    chunk_size: usize,
    policy: &InlinePolicy,
    mut on_chunk: F,
) -> CryptoResult<StreamSummary>
where
    R: Read,
    F: FnMut(&[u8]),
{
    if chunk_size == 0 {
        return Err(CryptoError::ZeroChunkSize);
    }
    let mut hasher = ContentHasher::new();
    let mut candidate = Some(Vec::new());
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let chunk = &buf[..n];
        hasher.update(chunk);
        on_chunk(chunk);
        if let Some(inline) = candidate.as_mut() {
            if policy.inlines(hasher.length() as usize) {
                inline.extend_from_slice(chunk);
            } else {
                candidate = None;
            }
        }
    }

    Ok(StreamSummary {
        length: hasher.length(),
        digest: hasher.finalize(),
        inline_candidate: candidate,
    })
}

/// Streaming key derivation for [`Key`].
pub trait KeyFromReader: Sized {
    /// Key of everything `reader` yields.
    fn from_reader<R: Read>(reader: R, role: Role) -> CryptoResult<Self>;

    /// Key of a file's content.
    fn from_file(path: impl AsRef<Path>, role: Role) -> CryptoResult<Self> {
        Self::from_reader(File::open(path)?, role)
    }
}

impl KeyFromReader for Key {
    fn from_reader<R: Read>(reader: R, role: Role) -> CryptoResult<Self> {
        Ok(process_stream(reader, DEFAULT_CHUNK_SIZE)?.key(role))
    }
}
