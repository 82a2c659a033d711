use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hs_types::ContentAddress;

use crate::error::StoreResult;

/// Where a blob's bytes live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Row in the shard's embedded database.
    EmbeddedRow,
    /// File named by the address inside the shard directory.
    FileOnDisk,
    /// Held by an in-memory store.
    Memory,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmbeddedRow => f.write_str("embedded_row"),
            Self::FileOnDisk => f.write_str("file_on_disk"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Metadata of a stored blob. Never updated once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub address: ContentAddress,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub tier: Tier,
}

#[derive(Clone)]
enum Source {
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

/// Result of a successful lookup: blob metadata plus access to its bytes.
#[derive(Clone)]
pub struct BlobHandle {
    blob: StoredBlob,
    source: Source,
}

impl BlobHandle {
    pub(crate) fn from_bytes(blob: StoredBlob, data: Arc<[u8]>) -> Self {
        Self {
            blob,
            source: Source::Bytes(data),
        }
    }

    pub(crate) fn from_file(blob: StoredBlob, path: PathBuf) -> Self {
        Self {
            blob,
            source: Source::File(path),
        }
    }

    pub fn blob(&self) -> &StoredBlob {
        &self.blob
    }

    pub fn address(&self) -> &ContentAddress {
        &self.blob.address
    }

    pub fn size(&self) -> u64 {
        self.blob.size
    }

    pub fn tier(&self) -> Tier {
        self.blob.tier
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.blob.created_at
    }

    /// `true` if the bytes are already in memory.
    pub fn is_loaded(&self) -> bool {
        matches!(self.source, Source::Bytes(_))
    }

    /// Read the whole blob.
    pub fn read_all(&self) -> StoreResult<Vec<u8>> {
        match &self.source {
            Source::Bytes(data) => Ok(data.to_vec()),
            Source::File(path) => Ok(std::fs::read(path)?),
        }
    }

    /// Stream the blob.
    pub fn open(&self) -> StoreResult<Box<dyn Read + Send>> {
        match &self.source {
            Source::Bytes(data) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            Source::File(path) => Ok(Box::new(File::open(path)?)),
        }
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("address", &self.blob.address)
            .field("size", &self.blob.size)
            .field("tier", &self.blob.tier)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
