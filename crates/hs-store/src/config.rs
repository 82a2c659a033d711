use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hs_types::InlinePolicy;

use crate::error::{StoreError, StoreResult};

/// Largest blob kept as a row in a shard database.
pub const DEFAULT_MAX_EMBEDDED_SIZE: usize = 1 << 16;
pub const DEFAULT_CACHE_ENTRIES: usize = 1000;
pub const DEFAULT_CACHE_MAX_BLOB_SIZE: usize = 80_000;

/// Blob store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the shard directories and the staging area.
    pub root: PathBuf,
    /// Blobs below this size are stored as database rows, others as files.
    pub max_embedded_size: usize,
    /// Number of blobs held by the read cache.
    pub cache_entries: usize,
    /// Only blobs below this size are cached.
    pub cache_max_blob_size: usize,
    /// Inline boundary used when deriving keys.
    pub inline_max: usize,
    /// Age after which an unresolved staging file counts as orphaned.
    #[serde(with = "duration_secs")]
    pub staging_grace: Duration,
    /// How long a database statement waits on a locked database.
    #[serde(with = "duration_secs")]
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("hashstore"),
            max_embedded_size: DEFAULT_MAX_EMBEDDED_SIZE,
            cache_entries: DEFAULT_CACHE_ENTRIES,
            cache_max_blob_size: DEFAULT_CACHE_MAX_BLOB_SIZE,
            inline_max: hs_types::INLINE_MAX,
            staging_grace: Duration::from_secs(60 * 60),
            busy_timeout: Duration::from_secs(10),
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_embedded_size == 0 {
            return Err(StoreError::Config("max_embedded_size must be positive".into()));
        }
        if self.cache_entries == 0 {
            return Err(StoreError::Config("cache_entries must be positive".into()));
        }
        if self.cache_max_blob_size == 0 {
            return Err(StoreError::Config(
                "cache_max_blob_size must be positive".into(),
            ));
        }
        if self.inline_max >= self.max_embedded_size {
            return Err(StoreError::Config(format!(
                "inline_max ({}) must be below max_embedded_size ({})",
                self.inline_max, self.max_embedded_size
            )));
        }
        Ok(())
    }

    pub fn inline_policy(&self) -> InlinePolicy {
        InlinePolicy::new(self.inline_max)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
