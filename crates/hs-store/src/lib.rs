//! Content-addressed blob storage for the hash store.
//!
//! Every blob is stored once, under the [`ContentAddress`] derived from the
//! SHA-256 of its bytes, in one of 8192 shard directories.
//!
//! # Tiers
//!
//! - Blobs below `max_embedded_size` (64 KiB by default) are rows in the
//!   shard's `blob.db`.
//! - Larger blobs are plain files named by their base-36 address.
//!
//! Writes stream through a [`ContentWriter`], which buffers in memory and
//! spills to a staging file under `incoming/` once the content outgrows the
//! database tier. Staged writes are tracked in a [`StagingLedger`] so that
//! abandoned temp files can be swept.
//!
//! # Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`ShardedBlobStore`] -- the on-disk store
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//!
//! [`ContentAddress`]: hs_types::ContentAddress

pub mod blob;
pub mod cache;
pub mod config;
pub mod error;
pub mod incoming;
pub mod memory;
pub mod shard_db;
pub mod store;
pub mod traits;
pub mod writer;

pub use blob::{BlobHandle, StoredBlob, Tier};
pub use cache::BlobCache;
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use incoming::{StagingFile, StagingLedger, SweepReport};
pub use memory::InMemoryBlobStore;
pub use shard_db::ShardDb;
pub use store::{ShardIter, ShardedBlobStore};
pub use traits::BlobStore;
pub use writer::{ContentWriter, WriterPhase};
