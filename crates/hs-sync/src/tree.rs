use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use hs_store::BlobStore;
use hs_types::{ContentAddress, DirectoryBundle, InlinePolicy, Key};

use crate::error::{SyncError, SyncResult};
use crate::types::{SyncReport, SyncRequest};

/// Tree-dedup sync engine.
///
/// Persists the directory bundles of a tree snapshot and reports which
/// referenced leaves the store does not hold yet. It never fetches anything
/// itself: the caller uploads the reported leaves and may resubmit the same
/// batch to confirm the tree is complete.
pub struct TreeSync<S> {
    store: S,
    policy: InlinePolicy,
}

impl<S: BlobStore> TreeSync<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, InlinePolicy::default())
    }

    /// Engine that recomputes bundle keys under `policy`.
    pub fn with_policy(store: S, policy: InlinePolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sync a wire-form batch.
    pub fn sync(&self, request: &SyncRequest) -> SyncResult<SyncReport> {
        let entries = request.entries()?;
        self.sync_bundles(&entries)
    }

    /// Sync `(asserted key, bundle)` pairs.
    ///
    /// Every bundle is checked against its asserted key before anything is
    /// written; one mismatch rejects the whole batch.
    pub fn sync_bundles(&self, batch: &[(Key, &DirectoryBundle)]) -> SyncResult<SyncReport> {
        for (key, bundle) in batch {
            let actual = bundle.own_key_with(&self.policy);
            if actual != *key {
                return Err(SyncError::Consistency {
                    expected: key.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        let mut stored_count = 0;
        for (key, bundle) in batch {
            if self.store_bundle(key, bundle)? {
                stored_count += 1;
            }
        }

        let batch_keys: HashSet<&Key> = batch.iter().map(|(key, _)| key).collect();
        let mut unseen: BTreeMap<String, Key> = BTreeMap::new();
        for (_, bundle) in batch {
            for (name, child) in bundle.iter() {
                if child.has_data() || (child.is_bundle() && batch_keys.contains(child)) {
                    continue;
                }
                let Ok(address) = ContentAddress::from_key(child) else {
                    debug!(%name, key = %child, "skipping child without a content address");
                    continue;
                };
                if !self.store.contains(&address)? {
                    unseen.insert(child.to_string(), child.clone());
                }
            }
        }

        let report = SyncReport {
            stored_count,
            unseen: unseen.into_values().collect(),
        };
        info!(
            bundles = batch.len(),
            stored = report.stored_count,
            unseen = report.unseen.len(),
            "tree sync batch complete"
        );
        Ok(report)
    }

    /// Write one bundle unless it is already stored. Returns `true` if written.
    fn store_bundle(&self, key: &Key, bundle: &DirectoryBundle) -> SyncResult<bool> {
        if key.has_data() {
            return Ok(false);
        }
        let address = ContentAddress::from_key(key)?;
        if self.store.contains(&address)? {
            return Ok(false);
        }
        let stored = self.store.store_bytes(bundle.canonical_bytes())?;
        if stored != address || !self.store.contains(&address)? {
            return Err(SyncError::Consistency {
                expected: address.to_string(),
                actual: stored.to_string(),
            });
        }
        debug!(key = %key, address = %address, size = bundle.size(), "bundle stored");
        Ok(true)
    }
}

/// [`TreeSync`] for async hosts. Each batch runs on tokio's blocking pool.
pub struct AsyncTreeSync<S> {
    inner: Arc<TreeSync<S>>,
}

impl<S> Clone for AsyncTreeSync<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: BlobStore + 'static> AsyncTreeSync<S> {
    pub fn new(engine: TreeSync<S>) -> Self {
        Self {
            inner: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &TreeSync<S> {
        &self.inner
    }

    pub async fn sync(&self, request: SyncRequest) -> SyncResult<SyncReport> {
        let engine = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || engine.sync(&request)).await?
    }
}
