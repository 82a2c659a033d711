use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::base_x::BASE62;
use crate::error::TypeError;

/// Size of a SHA-256 digest and of every non-inline key payload.
pub const DIGEST_LEN: usize = 32;

/// Default inline boundary: content of at most this many bytes is embedded
/// in its key instead of being hashed.
pub const INLINE_MAX: usize = 32;

/// How a key's payload is to be interpreted.
///
/// Encoded in the upper seven bits of the header byte, leaving room for
/// future hash algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyStructure {
    /// Payload is the content itself.
    Inline = 0,
    /// Payload is the SHA-256 digest of the content.
    Hashed = 1,
    /// Payload is a random 32-byte identifier of a mutable pointer.
    Portal = 2,
    /// Portal whose history is versioned.
    PortalVersioned = 3,
    /// Portal that mirrors a mounted directory.
    PortalMount = 4,
    /// Payload is an embedded path.
    EmbeddedPath = 5,
}

impl KeyStructure {
    pub const ALL: [KeyStructure; 6] = [
        Self::Inline,
        Self::Hashed,
        Self::Portal,
        Self::PortalVersioned,
        Self::PortalMount,
        Self::EmbeddedPath,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Portal-family structures: random identifiers, never content-derived.
    pub fn is_portal(&self) -> bool {
        matches!(
            self,
            Self::Portal | Self::PortalVersioned | Self::PortalMount
        )
    }

    /// Whether payloads of this structure may have any length.
    pub fn is_variable_length(&self) -> bool {
        matches!(self, Self::Inline | Self::EmbeddedPath)
    }

    /// Parse a portal structure name. An empty name means [`Portal`](Self::Portal).
    pub fn from_portal_name(name: &str) -> Result<Self, TypeError> {
        let structure = match name {
            "" | "PORTAL" => Self::Portal,
            "VTREE" | "PORTAL_VERSIONED" => Self::PortalVersioned,
            "DMOUNT" | "PORTAL_MOUNT" => Self::PortalMount,
            other => {
                return Err(TypeError::InvalidKey(format!(
                    "unknown portal type: {other}"
                )))
            }
        };
        Ok(structure)
    }
}

impl fmt::Display for KeyStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inline => "INLINE",
            Self::Hashed => "SHA256",
            Self::Portal => "PORTAL",
            Self::PortalVersioned => "PORTAL_VERSIONED",
            Self::PortalMount => "PORTAL_MOUNT",
            Self::EmbeddedPath => "EMBEDDED_PATH",
        };
        f.write_str(s)
    }
}

/// Whether a key names opaque data or a directory manifest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Role {
    #[default]
    Leaf = 0,
    Bundle = 1,
}

impl Role {
    pub fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            Self::Leaf
        } else {
            Self::Bundle
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf => f.write_str("LEAF"),
            Self::Bundle => f.write_str("BUNDLE"),
        }
    }
}

/// The inline-versus-hash policy applied wherever content is ingested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InlinePolicy {
    /// Largest payload, inclusive, that is embedded in the key.
    pub max_inline: usize,
}

impl Default for InlinePolicy {
    fn default() -> Self {
        Self {
            max_inline: INLINE_MAX,
        }
    }
}

impl InlinePolicy {
    pub const fn new(max_inline: usize) -> Self {
        Self { max_inline }
    }

    /// `true` if content of `len` bytes is embedded rather than hashed.
    pub fn inlines(&self, len: usize) -> bool {
        len <= self.max_inline
    }

    /// Build the key for content with the given digest.
    ///
    /// `buffer` is the content itself when the caller still has it; it is
    /// embedded if short enough, otherwise the digest is used.
    pub fn key_for(&self, digest: [u8; DIGEST_LEN], buffer: Option<&[u8]>, role: Role) -> Key {
        match buffer {
            Some(data) if self.inlines(data.len()) => Key::inline(data.to_vec(), role),
            _ => Key::hashed(digest, role),
        }
    }
}

/// Content address key.
///
/// One header byte `(structure << 1) | role` followed by the payload.
/// Small content (up to [`INLINE_MAX`] bytes) is embedded directly; larger
/// content is represented by its SHA-256 digest. The string form is the
/// base-62 encoding of the packed bytes.
///
/// Equality and hashing are structural over `(structure, role, payload)`.
#[derive(Clone)]
pub struct Key {
    structure: KeyStructure,
    role: Role,
    payload: Vec<u8>,
    digest: OnceLock<[u8; DIGEST_LEN]>,
}

impl Key {
    /// Build a key, checking the payload length for its structure.
    pub fn new(structure: KeyStructure, role: Role, payload: Vec<u8>) -> Result<Self, TypeError> {
        if !structure.is_variable_length() && payload.len() != DIGEST_LEN {
            return Err(TypeError::InvalidKey(format!(
                "{structure} payload must be {DIGEST_LEN} bytes, got {}",
                payload.len()
            )));
        }
        Ok(Self::from_parts(structure, role, payload))
    }

    fn from_parts(structure: KeyStructure, role: Role, payload: Vec<u8>) -> Self {
        Self {
            structure,
            role,
            payload,
            digest: OnceLock::new(),
        }
    }

    /// Key that embeds `data` directly.
    pub fn inline(data: Vec<u8>, role: Role) -> Self {
        Self::from_parts(KeyStructure::Inline, role, data)
    }

    /// Key for content with the given SHA-256 digest.
    pub fn hashed(digest: [u8; DIGEST_LEN], role: Role) -> Self {
        Self::from_parts(KeyStructure::Hashed, role, digest.to_vec())
    }

    /// Apply the default inline policy. See [`InlinePolicy::key_for`].
    pub fn from_digest_and_inline_data(
        digest: [u8; DIGEST_LEN],
        buffer: Option<&[u8]>,
        role: Role,
    ) -> Self {
        InlinePolicy::default().key_for(digest, buffer, role)
    }

    /// Key for an in-memory buffer.
    pub fn from_bytes(data: &[u8], role: Role) -> Self {
        let digest: [u8; DIGEST_LEN] = Sha256::digest(data).into();
        Self::from_digest_and_inline_data(digest, Some(data), role)
    }

    /// A fresh random [`Portal`](KeyStructure::Portal) identifier.
    pub fn new_random(role: Role) -> Self {
        let mut bytes = [0u8; DIGEST_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self::from_parts(KeyStructure::Portal, role, bytes.to_vec())
    }

    /// A fresh random identifier of a portal-family structure.
    pub fn new_portal(role: Role, structure: KeyStructure) -> Result<Self, TypeError> {
        if !structure.is_portal() {
            return Err(TypeError::InvalidKey(format!(
                "has to be a portal: {structure}"
            )));
        }
        let mut key = Self::new_random(role);
        key.structure = structure;
        Ok(key)
    }

    /// Same portal identifier re-tagged with another portal structure or role.
    pub fn transform_portal(&self, role: Role, structure: KeyStructure) -> Result<Self, TypeError> {
        if !self.is_portal() || !structure.is_portal() {
            return Err(TypeError::InvalidKey(format!(
                "has to be a portal: {} -> {structure}",
                self.structure
            )));
        }
        Ok(Self::from_parts(structure, role, self.payload.clone()))
    }

    /// Pack into the binary form: header byte followed by the payload.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Inverse of [`pack`](Self::pack).
    pub fn unpack(bytes: &[u8]) -> Result<Self, TypeError> {
        let (&header, payload) = bytes
            .split_first()
            .ok_or_else(|| TypeError::InvalidKey("empty key".into()))?;
        let structure = KeyStructure::from_u8(header >> 1).ok_or_else(|| {
            TypeError::InvalidKey(format!("unknown key structure {}", header >> 1))
        })?;
        Self::new(structure, Role::from_bit(header), payload.to_vec())
    }

    pub fn header(&self) -> u8 {
        ((self.structure as u8) << 1) | self.role as u8
    }

    pub fn structure(&self) -> KeyStructure {
        self.structure
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// `true` if the content is embedded in the key.
    pub fn has_data(&self) -> bool {
        self.structure == KeyStructure::Inline
    }

    /// Embedded content, for inline keys.
    pub fn data(&self) -> Option<&[u8]> {
        self.has_data().then_some(self.payload.as_slice())
    }

    /// `true` for keys that carry a content digest.
    pub fn is_resolved(&self) -> bool {
        self.structure == KeyStructure::Hashed
    }

    /// `true` for keys whose content can never change.
    pub fn is_immutable(&self) -> bool {
        self.has_data() || self.is_resolved()
    }

    pub fn is_portal(&self) -> bool {
        self.structure.is_portal()
    }

    pub fn is_bundle(&self) -> bool {
        self.role == Role::Bundle
    }

    /// Bucket number of this key's payload for fan-out indexes keyed by key.
    ///
    /// Uses the first two payload bytes, or the single byte of a one-byte
    /// payload, reduced modulo `base`. An empty payload lands in bucket zero.
    pub fn shard_num(&self, base: NonZeroU32) -> u32 {
        let n = match self.payload.as_slice() {
            [] => 0,
            [b] => *b as u32,
            [b1, b2, ..] => *b1 as u32 * 256 + *b2 as u32,
        };
        n % base.get()
    }

    /// The digest carried by a [`Hashed`](KeyStructure::Hashed) key.
    pub fn hash_bytes(&self) -> Result<[u8; DIGEST_LEN], TypeError> {
        if !self.is_resolved() {
            return Err(TypeError::NotHashBased(self.structure));
        }
        Ok(to_digest(&self.payload))
    }

    /// SHA-256 digest of the content this key names.
    ///
    /// Inline keys hash their payload on first use and cache the result.
    pub fn digest(&self) -> Result<[u8; DIGEST_LEN], TypeError> {
        match self.structure {
            KeyStructure::Hashed => Ok(to_digest(&self.payload)),
            KeyStructure::Inline => Ok(*self
                .digest
                .get_or_init(|| Sha256::digest(&self.payload).into())),
            other => Err(TypeError::NotHashBased(other)),
        }
    }
}

fn to_digest(payload: &[u8]) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(payload);
    out
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.structure == other.structure
            && self.role == other.role
            && self.payload == other.payload
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.structure.hash(state);
        self.role.hash(state);
        self.payload.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE62.encode(&self.pack()))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl FromStr for Key {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::unpack(&BASE62.decode(s)?)
    }
}

impl TryFrom<&str> for Key {
    type Error = TypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
