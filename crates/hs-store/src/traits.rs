use hs_types::{ContentAddress, Key};

use crate::blob::BlobHandle;
use crate::error::{StoreError, StoreResult};
use crate::store::ShardedBlobStore;

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written. The same content always lands at
///   the same address and is stored once.
/// - A committed blob is visible to every later lookup.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored.
pub trait BlobStore: Send + Sync {
    /// Find a blob. Returns `Ok(None)` if it is not stored.
    fn lookup(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>>;

    /// Store `data` and return its address. Idempotent.
    fn store_bytes(&self, data: &[u8]) -> StoreResult<ContentAddress>;

    /// Delete a blob. Returns `true` if it existed.
    fn delete(&self, address: &ContentAddress) -> StoreResult<bool>;

    /// Every stored address, in no particular order.
    fn addresses(&self) -> StoreResult<Vec<ContentAddress>>;

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        Ok(self.lookup(address)?.is_some())
    }

    /// Read a blob that must exist.
    fn get(&self, address: &ContentAddress) -> StoreResult<Vec<u8>> {
        self.lookup(address)?
            .ok_or(StoreError::NotFound(*address))?
            .read_all()
    }

    /// Look up the blob behind a hash-based key.
    fn lookup_key(&self, key: &Key) -> StoreResult<Option<BlobHandle>> {
        self.lookup(&ContentAddress::from_key(key)?)
    }

    fn contains_key(&self, key: &Key) -> StoreResult<bool> {
        self.contains(&ContentAddress::from_key(key)?)
    }
}

impl BlobStore for ShardedBlobStore {
    fn lookup(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>> {
        ShardedBlobStore::lookup(self, address)
    }

    fn store_bytes(&self, data: &[u8]) -> StoreResult<ContentAddress> {
        ShardedBlobStore::store_bytes(self, data)
    }

    fn delete(&self, address: &ContentAddress) -> StoreResult<bool> {
        ShardedBlobStore::delete(self, address)
    }

    fn addresses(&self) -> StoreResult<Vec<ContentAddress>> {
        self.iterate()?.collect()
    }

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        ShardedBlobStore::contains(self, address)
    }
}

impl<S: BlobStore + ?Sized> BlobStore for std::sync::Arc<S> {
    fn lookup(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>> {
        (**self).lookup(address)
    }

    fn store_bytes(&self, data: &[u8]) -> StoreResult<ContentAddress> {
        (**self).store_bytes(data)
    }

    fn delete(&self, address: &ContentAddress) -> StoreResult<bool> {
        (**self).delete(address)
    }

    fn addresses(&self) -> StoreResult<Vec<ContentAddress>> {
        (**self).addresses()
    }

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        (**self).contains(address)
    }
}

impl<S: BlobStore + ?Sized> BlobStore for &S {
    fn lookup(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>> {
        (**self).lookup(address)
    }

    fn store_bytes(&self, data: &[u8]) -> StoreResult<ContentAddress> {
        (**self).store_bytes(data)
    }

    fn delete(&self, address: &ContentAddress) -> StoreResult<bool> {
        (**self).delete(address)
    }

    fn addresses(&self) -> StoreResult<Vec<ContentAddress>> {
        (**self).addresses()
    }

    fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        (**self).contains(address)
    }
}
