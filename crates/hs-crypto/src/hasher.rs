use sha2::{Digest, Sha256};

use hs_types::{ContentAddress, Key, DIGEST_LEN};

/// Incremental SHA-256 content hasher.
///
/// Writers feed chunks as they arrive and finalize once at the end, so the
/// address of a blob is known without holding it in memory.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
    length: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.length += chunk.len() as u64;
    }

    /// Total bytes fed so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Digest of everything fed so far. The hasher can keep going.
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        self.inner.clone().finalize().into()
    }

    /// Consume the hasher and return the digest.
    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        self.inner.finalize().into()
    }

    /// Consume the hasher and return the address of the hashed content.
    pub fn finalize_address(self) -> ContentAddress {
        ContentAddress::from_digest(self.finalize())
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("length", &self.length)
            .field("digest", &hex::encode(&self.digest()[..8]))
            .finish()
    }
}

impl std::io::Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// SHA-256 of an in-memory buffer.
pub fn quick_hash(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(data).into()
}

/// Verify that `data` is the content named by `key`.
///
/// Always `false` for keys that are not content-derived.
pub fn verify(data: &[u8], key: &Key) -> bool {
    match key.data() {
        Some(inline) => inline == data,
        None => key.hash_bytes().map(|d| d == quick_hash(data)).unwrap_or(false),
    }
}
