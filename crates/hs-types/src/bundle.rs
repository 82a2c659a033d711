//! Directory bundles: content-addressable name -> key manifests.
//!
//! A bundle is serialized as the two-array JSON document
//! `[[name, ...], [key, ...]]` with names in sorted order. The canonical
//! byte form uses `", "` as the separator and escapes everything outside
//! printable ASCII as `\uXXXX`, so the same set of entries always hashes
//! to the same key.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::TypeError;
use crate::key::{InlinePolicy, Key, Role};

/// Derived values, computed on first use and dropped on mutation.
#[derive(Clone, Debug)]
struct Canonical {
    bytes: Vec<u8>,
    key: Key,
}

/// Sorted mapping of entry names to child keys.
#[derive(Clone, Default)]
pub struct DirectoryBundle {
    entries: BTreeMap<String, Key>,
    canonical: OnceLock<Canonical>,
}

/// One step of the patch that turns a previous bundle into this one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BundlePatch {
    Update { name: String, key: Key },
    Delete { name: String },
}

impl BundlePatch {
    pub fn name(&self) -> &str {
        match self {
            Self::Update { name, .. } | Self::Delete { name } => name,
        }
    }
}

impl DirectoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel name and key lists.
    ///
    /// A repeated name keeps the last key given for it.
    pub fn from_parts(names: Vec<String>, keys: Vec<Key>) -> Result<Self, TypeError> {
        if names.len() != keys.len() {
            return Err(TypeError::Decode(format!(
                "bundle has {} names but {} keys",
                names.len(),
                keys.len()
            )));
        }
        let mut bundle = Self::new();
        bundle.entries.extend(names.into_iter().zip(keys));
        Ok(bundle)
    }

    /// Parse the wire form. Names need not be sorted on the wire.
    pub fn parse(input: impl AsRef<[u8]>) -> Result<Self, TypeError> {
        let (names, keys): (Vec<String>, Vec<String>) = serde_json::from_slice(input.as_ref())
            .map_err(|e| TypeError::Decode(format!("malformed bundle: {e}")))?;
        let keys = keys
            .iter()
            .map(|k| k.parse())
            .collect::<Result<Vec<Key>, _>>()?;
        Self::from_parts(names, keys)
    }

    /// Insert or replace an entry. Returns the previous key for `name`.
    pub fn set(&mut self, name: impl Into<String>, key: Key) -> Option<Key> {
        self.canonical.take();
        self.entries.insert(name.into(), key)
    }

    pub fn delete(&mut self, name: &str) -> Option<Key> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.canonical.take();
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&Key> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in sorted-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Key)> {
        self.entries.iter().map(|(n, k)| (n.as_str(), k))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.values()
    }

    /// Name of an entry pointing at `key`, if any.
    pub fn get_name_by_key(&self, key: &Key) -> Option<&str> {
        self.iter().find(|(_, k)| *k == key).map(|(n, _)| n)
    }

    /// `true` if the entry is itself a bundle.
    pub fn is_bundle_entry(&self, name: &str) -> bool {
        self.get(name).is_some_and(Key::is_bundle)
    }

    fn canonical(&self) -> &Canonical {
        self.canonical.get_or_init(|| {
            let bytes = write_canonical(&self.entries).into_bytes();
            let digest: [u8; 32] = Sha256::digest(&bytes).into();
            let key = Key::from_digest_and_inline_data(digest, Some(&bytes), Role::Bundle);
            Canonical { bytes, key }
        })
    }

    /// Deterministic serialized form.
    pub fn canonical_bytes(&self) -> &[u8] {
        &self.canonical().bytes
    }

    /// Length of [`canonical_bytes`](Self::canonical_bytes).
    pub fn size(&self) -> usize {
        self.canonical().bytes.len()
    }

    /// The bundle's own key, under the default inline policy.
    pub fn own_key(&self) -> &Key {
        &self.canonical().key
    }

    /// The bundle's own key under a custom inline policy.
    pub fn own_key_with(&self, policy: &InlinePolicy) -> Key {
        let bytes = self.canonical_bytes();
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        policy.key_for(digest, Some(bytes), Role::Bundle)
    }

    /// Patch list turning `previous` into `self`, in sorted-name order.
    ///
    /// A name whose key switches between leaf and bundle is deleted then
    /// updated. Names pointing at two different sub-bundles are left out;
    /// those are diffed at their own level.
    pub fn diff(&self, previous: &DirectoryBundle) -> Vec<BundlePatch> {
        let mut names: Vec<&str> = self.names().chain(previous.names()).collect();
        names.sort_unstable();
        names.dedup();

        let mut patch = Vec::new();
        for name in names {
            match (self.get(name), previous.get(name)) {
                (None, Some(_)) => patch.push(BundlePatch::Delete { name: name.into() }),
                (Some(key), None) => patch.push(BundlePatch::Update {
                    name: name.into(),
                    key: key.clone(),
                }),
                (Some(key), Some(prev)) if key != prev => {
                    if key.is_bundle() && prev.is_bundle() {
                        continue;
                    }
                    if key.is_bundle() != prev.is_bundle() {
                        patch.push(BundlePatch::Delete { name: name.into() });
                    }
                    patch.push(BundlePatch::Update {
                        name: name.into(),
                        key: key.clone(),
                    });
                }
                _ => {}
            }
        }
        patch
    }
}

fn write_canonical(entries: &BTreeMap<String, Key>) -> String {
    let mut out = String::from("[[");
    for (i, name) in entries.keys().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_json_str(&mut out, name);
    }
    out.push_str("], [");
    for (i, key) in entries.values().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_json_str(&mut out, &key.to_string());
    }
    out.push_str("]]");
    out
}

/// Append `s` as a JSON string literal using only printable ASCII.
fn push_json_str(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

impl PartialEq for DirectoryBundle {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for DirectoryBundle {}

impl fmt::Debug for DirectoryBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for DirectoryBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.canonical_bytes()))
    }
}

impl FromIterator<(String, Key)> for DirectoryBundle {
    fn from_iter<I: IntoIterator<Item = (String, Key)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            canonical: OnceLock::new(),
        }
    }
}

impl Serialize for DirectoryBundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names: Vec<&str> = self.names().collect();
        let keys: Vec<&Key> = self.keys().collect();
        (names, keys).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DirectoryBundle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (names, keys) = <(Vec<String>, Vec<Key>)>::deserialize(deserializer)?;
        Self::from_parts(names, keys).map_err(D::Error::custom)
    }
}
