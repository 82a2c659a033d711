//! Foundation types for the hash store.
//!
//! This crate provides the addressing codecs and manifest types used
//! throughout the store. Every other `hs-*` crate depends on `hs-types`.
//!
//! # Key Types
//!
//! - [`BaseX`] -- Arbitrary-alphabet big-integer codec (base-36, base-62, ...)
//! - [`Key`] -- Tagged content key: inline bytes or a SHA-256 digest, plus a role
//! - [`ContentAddress`] -- Digest-derived, shard-aware on-disk identifier
//! - [`DirectoryBundle`] -- Canonical sorted name -> key manifest, itself content-addressed
//! - [`KeyPath`] / [`KeyOrPath`] -- Paths rooted at a key

pub mod address;
pub mod base_x;
pub mod bundle;
pub mod error;
pub mod key;
pub mod path;

pub use address::{is_valid_shard_name, shard_name, shard_of, ContentAddress, SHARD_COUNT};
pub use base_x::{BaseX, BASE36, BASE58, BASE62};
pub use bundle::{BundlePatch, DirectoryBundle};
pub use error::{ErrorKind, TypeError};
pub use key::{InlinePolicy, Key, KeyStructure, Role, DIGEST_LEN, INLINE_MAX};
pub use path::{KeyOrPath, KeyPath};
