//! Shard-aware on-disk identifiers derived from content digests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::base_x::BASE36;
use crate::error::TypeError;
use crate::key::{Key, DIGEST_LEN};

/// Number of shards a store is split into.
pub const SHARD_COUNT: u16 = 8192;

/// Longest valid shard directory name.
const MAX_SHARD_NAME_LEN: usize = 3;

/// Shard a digest belongs to: first two bytes, big-endian, modulo [`SHARD_COUNT`].
pub fn shard_of(digest: &[u8; DIGEST_LEN]) -> u16 {
    let n = u16::from_be_bytes([digest[0], digest[1]]);
    n % SHARD_COUNT
}

/// Directory name of a shard (lowercase base-36).
pub fn shard_name(shard_id: u16) -> String {
    BASE36.encode_int(shard_id as u64)
}

/// Parse a shard directory name, case-insensitively.
pub fn parse_shard_name(name: &str) -> Option<u16> {
    if name.is_empty() || name.len() > MAX_SHARD_NAME_LEN {
        return None;
    }
    let n = BASE36.decode_int(&name.to_ascii_lowercase()).ok()?;
    (n < SHARD_COUNT as u64).then_some(n as u16)
}

/// `true` if `name` can be the directory name of a shard.
pub fn is_valid_shard_name(name: &str) -> bool {
    parse_shard_name(name).is_some()
}

/// Hash-derived address of a stored blob.
///
/// Two addresses are equal iff their digests are equal; the string form is
/// the lowercase base-36 encoding of the digest and parses case-insensitively.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress {
    digest: [u8; DIGEST_LEN],
}

impl ContentAddress {
    pub fn from_digest(digest: [u8; DIGEST_LEN]) -> Self {
        Self { digest }
    }

    /// Address of the content named by `key`.
    ///
    /// Fails with [`TypeError::NotHashBased`] for portal and embedded-path keys.
    pub fn from_key(key: &Key) -> Result<Self, TypeError> {
        Ok(Self::from_digest(key.digest()?))
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    pub fn shard_id(&self) -> u16 {
        shard_of(&self.digest)
    }

    pub fn shard_name(&self) -> String {
        shard_name(self.shard_id())
    }

    /// File name of the blob inside its shard directory.
    pub fn to_filename(&self) -> String {
        BASE36.encode(&self.digest)
    }

    /// `true` if `key` names the content at this address.
    pub fn matches(&self, key: &Key) -> bool {
        key.digest().map(|d| d == self.digest).unwrap_or(false)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_filename())
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", hex::encode(&self.digest[..8]))
    }
}

impl FromStr for ContentAddress {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE36.decode(&s.to_ascii_lowercase())?;
        let digest: [u8; DIGEST_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| TypeError::InvalidLength {
                    expected: DIGEST_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_digest(digest))
    }
}

impl TryFrom<&Key> for ContentAddress {
    type Error = TypeError;

    fn try_from(key: &Key) -> Result<Self, Self::Error> {
        Self::from_key(key)
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Role;
    use proptest::prelude::*;

    const A46_ADDRESS: &str = "2jr7e7m1dz6uky4soq7eaflekjlgzwsvech6skma3ojl4tc0zv";

    fn a46() -> Key {
        Key::from_bytes(&[b'a'; 46], Role::Leaf)
    }

    #[test]
    fn address_from_hashed_key() {
        let key = a46();
        assert_eq!(key.to_string(), "2lEWHXV2XeYyZnKNyQyGPt4poJhV7VeYCfeszHnLyFtx");
        let address = ContentAddress::from_key(&key).unwrap();
        assert_eq!(address.to_string(), A46_ADDRESS);
        assert_eq!(address.shard_id(), 1603);
        assert_eq!(address.shard_name(), "18j");
        assert!(address.matches(&key));
        assert!(!address.matches(&Key::from_bytes(&[b'a'; 47], Role::Leaf)));
    }

    #[test]
    fn parse_is_case_insensitive() {
        let lower: ContentAddress = A46_ADDRESS.parse().unwrap();
        let upper: ContentAddress = A46_ADDRESS.to_uppercase().parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.to_string(), A46_ADDRESS);
    }

    #[test]
    fn parse_requires_full_digest() {
        assert!(matches!(
            "abc".parse::<ContentAddress>(),
            Err(TypeError::InvalidLength { expected: 32, .. })
        ));
        assert!(matches!(
            "ab-c".parse::<ContentAddress>(),
            Err(TypeError::Decode(_))
        ));
    }

    #[test]
    fn inline_keys_hash_their_payload() {
        let key = Key::from_bytes(b"ABC", Role::Leaf);
        let address = ContentAddress::from_key(&key).unwrap();
        assert_eq!(address.digest(), &key.digest().unwrap());
        assert!(address.matches(&key));
    }

    #[test]
    fn portals_have_no_address() {
        let portal = Key::new_random(Role::Leaf);
        assert!(matches!(
            ContentAddress::from_key(&portal),
            Err(TypeError::NotHashBased(_))
        ));
    }

    #[test]
    fn lorem_shard() {
        let key = Key::from_bytes(
            b"Lorem ipsum dolor sit amet, consectetur adipiscing elit, \
sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.",
            Role::Leaf,
        );
        assert_eq!(ContentAddress::from_key(&key).unwrap().shard_id(), 5937);
    }

    #[test]
    fn shard_names() {
        assert_eq!(shard_name(0), "0");
        assert_eq!(shard_name(8000), "668");
        assert!(is_valid_shard_name("668"));
        assert!(is_valid_shard_name("0"));
        assert!(is_valid_shard_name("5BK"));
        assert!(!is_valid_shard_name("6bk"));
        assert!(!is_valid_shard_name("6BK"));
        assert!(!is_valid_shard_name(""));
        assert!(!is_valid_shard_name(".5k"));
        assert!(!is_valid_shard_name("abcd"));
        assert!(!is_valid_shard_name("incoming"));
        assert_eq!(parse_shard_name("18J"), Some(1603));
    }

    #[test]
    fn serde_as_string() {
        let address: ContentAddress = A46_ADDRESS.parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{A46_ADDRESS}\""));
        assert_eq!(serde_json::from_str::<ContentAddress>(&json).unwrap(), address);
    }

    proptest! {
        #[test]
        fn every_shard_is_nameable(digest in any::<[u8; 32]>()) {
            let shard = shard_of(&digest);
            prop_assert!(shard < SHARD_COUNT);
            prop_assert!(is_valid_shard_name(&shard_name(shard)));
            prop_assert_eq!(parse_shard_name(&shard_name(shard)), Some(shard));
        }

        #[test]
        fn filename_roundtrip(digest in any::<[u8; 32]>()) {
            let address = ContentAddress::from_digest(digest);
            let parsed: ContentAddress = address.to_filename().parse().unwrap();
            prop_assert_eq!(parsed, address);
        }
    }
}
