use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use hs_types::{address::parse_shard_name, ContentAddress};

use crate::blob::{BlobHandle, StoredBlob, Tier};
use crate::cache::BlobCache;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::incoming::{StagingFile, StagingLedger, SweepReport};
use crate::shard_db::{ShardDb, SHARD_DB_FILE};
use crate::writer::ContentWriter;

/// Sharded, dual-tier blob store.
///
/// Layout under the root:
///
/// ```text
/// incoming/<id>.tmp     staged writes
/// incoming.db           staging ledger
/// <shard>/blob.db       blobs below max_embedded_size, one row each
/// <shard>/<address>     larger blobs, one file each
/// ```
///
/// Lookups check the read cache, then the file tier, then the database
/// tier. Content at an address is never overwritten.
pub struct ShardedBlobStore {
    config: StoreConfig,
    ledger: StagingLedger,
    cache: BlobCache,
}

impl ShardedBlobStore {
    /// Open (creating if needed) the store described by `config`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.root)?;
        let ledger = StagingLedger::open(&config.root, config.busy_timeout)?;
        let cache = BlobCache::new(config.cache_entries, config.cache_max_blob_size);
        info!(root = %config.root.display(), "blob store opened");
        Ok(Self {
            config,
            ledger,
            cache,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn staging_ledger(&self) -> &StagingLedger {
        &self.ledger
    }

    pub(crate) fn ledger(&self) -> &StagingLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &BlobCache {
        &self.cache
    }

    /// `true` if a blob of `len` bytes belongs in the database tier.
    pub(crate) fn embeds(&self, len: usize) -> bool {
        len < self.config.max_embedded_size
    }

    fn shard_dir(&self, address: &ContentAddress) -> PathBuf {
        self.config.root.join(address.shard_name())
    }

    /// Path a file-tier blob lives at.
    pub fn blob_path(&self, address: &ContentAddress) -> PathBuf {
        self.shard_dir(address).join(address.to_filename())
    }

    fn shard_db(&self, address: &ContentAddress) -> ShardDb {
        ShardDb::new(&self.shard_dir(address), self.config.busy_timeout)
    }

    // ---- reads ----

    /// Find a blob. A miss is `Ok(None)`.
    pub fn lookup(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>> {
        if let Some(hit) = self.cache.get(address) {
            return Ok(Some(hit));
        }
        if let Some(hit) = self.lookup_file(address)? {
            return Ok(Some(hit));
        }
        self.lookup_row(address)
    }

    fn lookup_file(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>> {
        let path = self.blob_path(address);
        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let created_at: DateTime<Utc> = meta
            .created()
            .or_else(|_| meta.modified())
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let blob = StoredBlob {
            address: *address,
            size: meta.len(),
            created_at,
            tier: Tier::FileOnDisk,
        };
        if self.cache.admits(blob.size) {
            let data: Arc<[u8]> = fs::read(&path)?.into();
            self.cache.insert(blob.clone(), Arc::clone(&data));
            return Ok(Some(BlobHandle::from_bytes(blob, data)));
        }
        Ok(Some(BlobHandle::from_file(blob, path)))
    }

    fn lookup_row(&self, address: &ContentAddress) -> StoreResult<Option<BlobHandle>> {
        let Some((content, created_at)) = self.shard_db(address).get(address)? else {
            return Ok(None);
        };
        let blob = StoredBlob {
            address: *address,
            size: content.len() as u64,
            created_at,
            tier: Tier::EmbeddedRow,
        };
        let data: Arc<[u8]> = content.into();
        self.cache.insert(blob.clone(), Arc::clone(&data));
        Ok(Some(BlobHandle::from_bytes(blob, data)))
    }

    /// `true` if the blob is stored, without reading it.
    pub fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        if self.cache.contains(address) || self.blob_path(address).is_file() {
            return Ok(true);
        }
        self.shard_db(address).contains(address)
    }

    /// Read a blob that must exist.
    pub fn get(&self, address: &ContentAddress) -> StoreResult<Vec<u8>> {
        self.lookup(address)?
            .ok_or(StoreError::NotFound(*address))?
            .read_all()
    }

    // ---- writes ----

    /// Start a streaming write.
    pub fn writer(&self) -> ContentWriter<'_> {
        ContentWriter::new(self)
    }

    pub fn store_bytes(&self, data: &[u8]) -> StoreResult<ContentAddress> {
        let mut writer = self.writer();
        writer.write(data)?;
        writer.done()
    }

    /// Store everything `reader` yields, reading `chunk_size` bytes at a time.
    pub fn store_stream<R: Read>(
        &self,
        mut reader: R,
        chunk_size: usize,
    ) -> StoreResult<ContentAddress> {
        if chunk_size == 0 {
            return Err(StoreError::InvalidArgument("chunk size must be positive".into()));
        }
        let mut writer = self.writer();
        let mut buf = vec![0u8; chunk_size];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            writer.write(&buf[..n])?;
        }
        writer.done()
    }

    /// Commit buffered content as a database row. Returns `true` if a blob was created.
    pub(crate) fn commit_buffer(
        &self,
        address: &ContentAddress,
        content: &[u8],
    ) -> StoreResult<bool> {
        if self.blob_path(address).is_file() {
            debug!(address = %address, "duplicate blob, already on disk");
            return Ok(false);
        }
        let new = self.shard_db(address).insert(address, content)?;
        debug!(
            address = %address,
            shard = %address.shard_name(),
            size = content.len(),
            new,
            "blob committed to shard db"
        );
        Ok(new)
    }

    /// Move a staged file into place, or discard it if the blob already exists.
    ///
    /// The target is created exclusively: when two writers race on one
    /// address, exactly one links its file in and the other discards.
    pub(crate) fn commit_staged(
        &self,
        address: &ContentAddress,
        staging: &StagingFile,
    ) -> StoreResult<bool> {
        let target = self.blob_path(address);
        let new = if self.shard_db(address).contains(address)? {
            false
        } else {
            fs::create_dir_all(self.shard_dir(address))?;
            match fs::hard_link(&staging.temp_path, &target) {
                Ok(()) => true,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
                Err(e) => return Err(e.into()),
            }
        };
        match fs::remove_file(&staging.temp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if new {
            debug!(
                address = %address,
                shard = %address.shard_name(),
                staging_id = staging.staging_id,
                "blob committed to file"
            );
        } else {
            debug!(
                address = %address,
                path = %staging.temp_path.display(),
                "duplicate blob, staging file discarded"
            );
        }
        self.ledger.resolve(staging.staging_id, address, new)?;
        Ok(new)
    }

    /// Remove a blob from every tier. Maintenance only: anything still
    /// referencing the address will dangle.
    pub fn delete(&self, address: &ContentAddress) -> StoreResult<bool> {
        self.cache.remove(address);
        let file_removed = match fs::remove_file(self.blob_path(address)) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let row_removed = self.shard_db(address).delete(address)?;
        if file_removed || row_removed {
            debug!(address = %address, "blob deleted");
        }
        Ok(file_removed || row_removed)
    }

    // ---- maintenance ----

    /// Remove staging files abandoned for longer than `staging_grace`.
    pub fn sweep_orphans(&self) -> StoreResult<SweepReport> {
        self.ledger.sweep_orphans(self.config.staging_grace)
    }

    /// Lazily enumerate every stored address, shard by shard.
    pub fn iterate(&self) -> StoreResult<ShardIter<'_>> {
        let mut shards: Vec<(u16, String)> = Vec::new();
        for entry in fs::read_dir(&self.config.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = parse_shard_name(&name) {
                shards.push((id, name));
            }
        }
        shards.sort();
        Ok(ShardIter {
            store: self,
            shards: shards.into_iter().map(|(_, name)| name).collect::<Vec<_>>().into_iter(),
            current: Vec::new().into_iter(),
        })
    }

    fn shard_addresses(&self, shard: &str) -> StoreResult<Vec<ContentAddress>> {
        let dir = self.config.root.join(shard);
        let mut addresses = ShardDb::new(&dir, self.config.busy_timeout).addresses()?;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(SHARD_DB_FILE) || !entry.file_type()?.is_file() {
                continue;
            }
            match name.parse::<ContentAddress>() {
                Ok(address) => addresses.push(address),
                Err(err) => warn!(shard, %name, %err, "skipping unrecognized file in shard"),
            }
        }
        Ok(addresses)
    }
}

impl std::fmt::Debug for ShardedBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedBlobStore")
            .field("root", &self.config.root)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Iterator over every address in a [`ShardedBlobStore`].
///
/// Finite. Each shard is read when the iterator reaches it, so a failed
/// shard is reported once and iteration resumes at the next one.
pub struct ShardIter<'a> {
    store: &'a ShardedBlobStore,
    shards: std::vec::IntoIter<String>,
    current: std::vec::IntoIter<ContentAddress>,
}

impl Iterator for ShardIter<'_> {
    type Item = StoreResult<ContentAddress>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(address) = self.current.next() {
                return Some(Ok(address));
            }
            let shard = self.shards.next()?;
            match self.store.shard_addresses(&shard) {
                Ok(addresses) => self.current = addresses.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriterPhase;
    use proptest::prelude::*;

    fn open(dir: &Path) -> ShardedBlobStore {
        ShardedBlobStore::open(StoreConfig::new(dir)).unwrap()
    }

    fn small_limit(dir: &Path) -> ShardedBlobStore {
        let mut config = StoreConfig::new(dir);
        config.max_embedded_size = 64;
        config.cache_max_blob_size = 16;
        ShardedBlobStore::open(config).unwrap()
    }

    #[test]
    fn open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let _store = open(dir.path());
        assert!(dir.path().join("incoming").is_dir());
        assert!(dir.path().join("incoming.db").is_file());
    }

    #[test]
    fn small_blob_goes_to_shard_db() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let address = store.store_bytes(b"hello world").unwrap();
        assert!(dir.path().join(address.shard_name()).join("blob.db").is_file());
        assert!(!store.blob_path(&address).exists());
        let handle = store.lookup(&address).unwrap().unwrap();
        assert_eq!(handle.size(), 11);
        assert_eq!(handle.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn db_hit_populates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let address = store.store_bytes(b"cached").unwrap();
        assert!(!store.cache().contains(&address));
        let first = store.lookup(&address).unwrap().unwrap();
        assert_eq!(first.tier(), Tier::EmbeddedRow);
        assert!(store.cache().contains(&address));
        let second = store.lookup(&address).unwrap().unwrap();
        assert_eq!(second.tier(), Tier::EmbeddedRow);
        assert_eq!(second.read_all().unwrap(), b"cached");
    }

    #[test]
    fn large_blob_goes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_limit(dir.path());
        let data = vec![42u8; 200];
        let address = store.store_bytes(&data).unwrap();
        assert!(store.blob_path(&address).is_file());
        let handle = store.lookup(&address).unwrap().unwrap();
        assert_eq!(handle.tier(), Tier::FileOnDisk);
        assert!(!handle.is_loaded());
        assert_eq!(handle.read_all().unwrap(), data);
        assert!(store.staging_ledger().unresolved().unwrap().is_empty());
    }

    #[test]
    fn final_size_decides_tier() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_limit(dir.path());
        let mut writer = store.writer();
        assert_eq!(writer.phase(), WriterPhase::Accumulating);
        writer.write(&[1u8; 40]).unwrap();
        assert_eq!(writer.phase(), WriterPhase::Buffered);
        writer.write(&[1u8; 23]).unwrap();
        assert_eq!(writer.phase(), WriterPhase::Buffered);
        writer.write(&[1u8; 1]).unwrap();
        assert_eq!(writer.phase(), WriterPhase::Staged);
        assert!(writer.staging_file().unwrap().temp_path.is_file());
        let address = writer.done().unwrap();
        assert_eq!(writer.phase(), WriterPhase::Committed);
        assert_eq!(store.get(&address).unwrap(), vec![1u8; 64]);
        assert_eq!(
            store.lookup(&address).unwrap().unwrap().tier(),
            Tier::FileOnDisk
        );
    }

    #[test]
    fn done_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let mut writer = store.writer();
        writer.write(b"abc").unwrap();
        let first = writer.done().unwrap();
        let second = writer.done().unwrap();
        assert_eq!(first, second);
        assert!(matches!(writer.write(b"more"), Err(StoreError::WriterClosed)));
    }

    #[test]
    fn duplicate_staged_write_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_limit(dir.path());
        let data = vec![9u8; 500];
        let first = store.store_bytes(&data).unwrap();
        let before = fs::metadata(store.blob_path(&first)).unwrap().modified().unwrap();
        let second = store.store_bytes(&data).unwrap();
        assert_eq!(first, second);
        let after = fs::metadata(store.blob_path(&first)).unwrap().modified().unwrap();
        assert_eq!(before, after);
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("incoming")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn staged_commit_never_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_limit(dir.path());
        let data = vec![6u8; 300];
        let address = ContentAddress::from_digest(hs_crypto::quick_hash(&data));

        let (staging, mut file) = store.ledger().begin().unwrap();
        std::io::Write::write_all(&mut file, &data).unwrap();
        drop(file);
        // Another writer links its file in after this one started staging.
        fs::create_dir_all(store.shard_dir(&address)).unwrap();
        fs::write(store.blob_path(&address), b"first writer").unwrap();

        assert!(!store.commit_staged(&address, &staging).unwrap());
        assert_eq!(fs::read(store.blob_path(&address)).unwrap(), b"first writer");
        assert!(!staging.temp_path.exists());
        assert!(store.ledger().unresolved().unwrap().is_empty());

        let (staging, mut file) = store.ledger().begin().unwrap();
        std::io::Write::write_all(&mut file, &data).unwrap();
        drop(file);
        fs::remove_file(store.blob_path(&address)).unwrap();
        assert!(store.commit_staged(&address, &staging).unwrap());
        assert_eq!(store.get(&address).unwrap(), data);
        assert!(!staging.temp_path.exists());
    }

    #[test]
    fn empty_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let address = store.writer().done().unwrap();
        assert_eq!(address.digest(), &hs_crypto::quick_hash(b""));
        assert_eq!(store.get(&address).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let address = ContentAddress::from_digest([5; 32]);
        assert!(store.lookup(&address).unwrap().is_none());
        assert!(!store.contains(&address).unwrap());
        assert!(matches!(store.get(&address), Err(StoreError::NotFound(a)) if a == address));
    }

    #[test]
    fn stream_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_limit(dir.path());
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let streamed = store.store_stream(&data[..], 7).unwrap();
        assert_eq!(streamed, ContentAddress::from_digest(hs_crypto::quick_hash(&data)));
        assert_eq!(store.get(&streamed).unwrap(), data);
        assert!(matches!(
            store.store_stream(&data[..], 0),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn delete_removes_every_tier() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_limit(dir.path());
        let small = store.store_bytes(b"tiny").unwrap();
        let large = store.store_bytes(&[3u8; 300]).unwrap();
        store.lookup(&small).unwrap();
        assert!(store.delete(&small).unwrap());
        assert!(store.delete(&large).unwrap());
        assert!(!store.delete(&large).unwrap());
        assert!(store.lookup(&small).unwrap().is_none());
        assert!(store.lookup(&large).unwrap().is_none());
    }

    #[test]
    fn iterate_covers_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_limit(dir.path());
        let mut expected = vec![
            store.store_bytes(b"one").unwrap(),
            store.store_bytes(b"two").unwrap(),
            store.store_bytes(&[7u8; 100]).unwrap(),
            store.store_bytes(&[8u8; 100]).unwrap(),
        ];
        fs::create_dir_all(dir.path().join("not-a-shard")).unwrap();
        fs::write(dir.path().join("zzzz"), b"stray").unwrap();
        let mut found: Vec<_> = store.iterate().unwrap().collect::<StoreResult<_>>().unwrap();
        expected.sort();
        found.sort();
        assert_eq!(found, expected);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn chunked_writes_match_whole_content(
            data in prop::collection::vec(any::<u8>(), 0..200),
            chunk in 1usize..50,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let store = small_limit(dir.path());
            let mut writer = store.writer();
            for piece in data.chunks(chunk) {
                writer.write(piece).unwrap();
            }
            let address = writer.done().unwrap();
            prop_assert_eq!(address, ContentAddress::from_digest(hs_crypto::quick_hash(&data)));
            prop_assert_eq!(store.get(&address).unwrap(), data.clone());
            let expected = if data.len() < 64 { Tier::EmbeddedRow } else { Tier::FileOnDisk };
            prop_assert_eq!(store.lookup(&address).unwrap().unwrap().tier(), expected);
        }
    }
}
