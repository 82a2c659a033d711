use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use hs_crypto::quick_hash;
use hs_types::ContentAddress;

use crate::blob::{BlobHandle, StoredBlob, Tier};
use crate::error::StoreResult;
use crate::traits::BlobStore;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are held behind a `RwLock` and
/// shared with readers without copying.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<ContentAddress, (StoredBlob, Arc<[u8]>)>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|(blob, _)| blob.size)
            .sum()
    }

    pub fn clear(&self) {
        self.blobs.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn lookup(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map
            .get(address)
            .map(|(blob, data)| BlobHandle::from_bytes(blob.clone(), Arc::clone(data))))
    }

    fn store_bytes(&self, data: &[u8]) -> StoreResult<ContentAddress> {
        let address = ContentAddress::from_digest(quick_hash(data));
        let mut map = self.blobs.write().expect("lock poisoned");
        map.entry(address).or_insert_with(|| {
            let blob = StoredBlob {
                address,
                size: data.len() as u64,
                created_at: Utc::now(),
                tier: Tier::Memory,
            };
            (blob, data.into())
        });
        Ok(address)
    }

    fn delete(&self, address: &ContentAddress) -> StoreResult<bool> {
        let mut map = self.blobs.write().expect("lock poisoned");
        Ok(map.remove(address).is_some())
    }

    fn addresses(&self) -> StoreResult<Vec<ContentAddress>> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut addresses: Vec<ContentAddress> = map.keys().copied().collect();
        addresses.sort();
        Ok(addresses)
    }

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(address))
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}
