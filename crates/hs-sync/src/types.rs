use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hs_types::{DirectoryBundle, Key, TypeError};

/// A batch of directory bundles, keyed by the key string each bundle is
/// asserted to hash to.
///
/// Wire form: `{"<bundle key>": [[names...], [keys...]], ...}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRequest {
    pub directories: BTreeMap<String, DirectoryBundle>,
}

impl SyncRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bundle under its own key and return that key.
    pub fn insert(&mut self, bundle: DirectoryBundle) -> Key {
        let key = bundle.own_key().clone();
        self.directories.insert(key.to_string(), bundle);
        key
    }

    /// Add a bundle under a caller-asserted key.
    pub fn insert_with_key(&mut self, key: &Key, bundle: DirectoryBundle) {
        self.directories.insert(key.to_string(), bundle);
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Parse every asserted key.
    pub fn entries(&self) -> Result<Vec<(Key, &DirectoryBundle)>, TypeError> {
        self.directories
            .iter()
            .map(|(key, bundle)| Ok((key.parse::<Key>()?, bundle)))
            .collect()
    }

    pub fn from_json(input: &str) -> Result<Self, TypeError> {
        serde_json::from_str(input).map_err(|e| TypeError::Decode(e.to_string()))
    }
}

impl FromIterator<DirectoryBundle> for SyncRequest {
    fn from_iter<I: IntoIterator<Item = DirectoryBundle>>(iter: I) -> Self {
        let mut request = Self::new();
        for bundle in iter {
            request.insert(bundle);
        }
        request
    }
}

/// Outcome of a sync batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Bundles written by this call.
    pub stored_count: usize,
    /// Leaf keys the store still lacks, sorted by key string.
    pub unseen: Vec<Key>,
}

impl SyncReport {
    /// `true` once the store holds everything the batch references.
    pub fn is_complete(&self) -> bool {
        self.unseen.is_empty()
    }
}
