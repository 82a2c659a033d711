use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use hs_types::ContentAddress;

use crate::blob::{BlobHandle, StoredBlob};

#[derive(Clone)]
struct CachedBlob {
    blob: StoredBlob,
    data: Arc<[u8]>,
}

/// Bounded LRU cache of small, recently read blobs.
///
/// Entries are immutable once inserted. Eviction is by entry count only.
pub struct BlobCache {
    entries: Mutex<LruCache<ContentAddress, CachedBlob>>,
    max_blob_size: usize,
}

impl BlobCache {
    pub fn new(capacity: usize, max_blob_size: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_blob_size,
        }
    }

    /// `true` if a blob of `size` bytes is small enough to cache.
    pub fn admits(&self, size: u64) -> bool {
        size < self.max_blob_size as u64
    }

    pub fn get(&self, address: &ContentAddress) -> Option<BlobHandle> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries
            .get(address)
            .map(|c| BlobHandle::from_bytes(c.blob.clone(), Arc::clone(&c.data)))
    }

    pub fn contains(&self, address: &ContentAddress) -> bool {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .contains(address)
    }

    /// Cache `data` if it is small enough. Returns whether it was cached.
    pub fn insert(&self, blob: StoredBlob, data: Arc<[u8]>) -> bool {
        if !self.admits(blob.size) {
            return false;
        }
        let address = blob.address;
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .put(address, CachedBlob { blob, data });
        true
    }

    pub fn remove(&self, address: &ContentAddress) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .pop(address);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for BlobCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobCache")
            .field("entries", &self.len())
            .field("max_blob_size", &self.max_blob_size)
            .finish()
    }
}
