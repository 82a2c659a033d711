//! Tree-dedup sync for the hash store.
//!
//! A client describes a directory tree as a batch of
//! [`DirectoryBundle`](hs_types::DirectoryBundle)s. [`TreeSync`] stores the
//! bundles the server lacks and answers with the leaf keys it still needs,
//! so only missing content ever crosses the wire.

pub mod error;
pub mod tree;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use tree::{AsyncTreeSync, TreeSync};
pub use types::{SyncReport, SyncRequest};
