use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::{debug, warn};

use hs_crypto::ContentHasher;
use hs_types::ContentAddress;

use crate::error::{StoreError, StoreResult};
use crate::incoming::StagingFile;
use crate::store::ShardedBlobStore;

/// Observable phase of a [`ContentWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterPhase {
    /// Nothing written yet.
    Accumulating,
    /// Content held in memory; commits as a database row.
    Buffered,
    /// Content spilled to a staging file; commits as a file.
    Staged,
    /// Content committed; the address is final.
    Committed,
    /// A staging write failed. The temp file is kept for the sweep.
    Failed,
}

enum State {
    Buffering(Vec<u8>),
    Staged {
        staging: StagingFile,
        file: Option<BufWriter<File>>,
    },
    Committed(ContentAddress),
    Failed,
}

/// Streaming writer that picks the storage tier from the final size.
///
/// Chunks are buffered in memory until the next one would reach the
/// embedded-size limit, at which point everything spills to a staging file
/// and streaming continues there. [`done`](Self::done) commits and returns
/// the address; calling it again returns the same address.
pub struct ContentWriter<'a> {
    store: &'a ShardedBlobStore,
    hasher: ContentHasher,
    state: State,
}

impl<'a> ContentWriter<'a> {
    pub(crate) fn new(store: &'a ShardedBlobStore) -> Self {
        Self {
            store,
            hasher: ContentHasher::new(),
            state: State::Buffering(Vec::new()),
        }
    }

    pub fn phase(&self) -> WriterPhase {
        match &self.state {
            State::Buffering(buf) if buf.is_empty() => WriterPhase::Accumulating,
            State::Buffering(_) => WriterPhase::Buffered,
            State::Staged { .. } => WriterPhase::Staged,
            State::Committed(_) => WriterPhase::Committed,
            State::Failed => WriterPhase::Failed,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.hasher.length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Staging ledger entry, once the writer has spilled.
    pub fn staging_file(&self) -> Option<&StagingFile> {
        match &self.state {
            State::Staged { staging, .. } => Some(staging),
            _ => None,
        }
    }

    /// Append a chunk.
    pub fn write(&mut self, chunk: &[u8]) -> StoreResult<()> {
        match &mut self.state {
            State::Committed(_) | State::Failed => return Err(StoreError::WriterClosed),
            State::Buffering(buf) if self.store.embeds(buf.len() + chunk.len()) => {
                buf.extend_from_slice(chunk);
            }
            State::Buffering(buf) => {
                let (staging, file) = self.store.ledger().begin()?;
                let buffered = std::mem::take(buf);
                debug!(
                    staging_id = staging.staging_id,
                    buffered = buffered.len(),
                    "writer spilled to staging"
                );
                let mut file = BufWriter::new(file);
                let written = file.write_all(&buffered).and_then(|_| file.write_all(chunk));
                self.state = State::Staged {
                    staging,
                    file: Some(file),
                };
                if let Err(e) = written {
                    self.state = State::Failed;
                    return Err(e.into());
                }
            }
            State::Staged { file, .. } => {
                let Some(file) = file.as_mut() else {
                    return Err(StoreError::WriterClosed);
                };
                if let Err(e) = file.write_all(chunk) {
                    self.state = State::Failed;
                    return Err(e.into());
                }
            }
        }
        self.hasher.update(chunk);
        Ok(())
    }

    /// Commit the content and return its address.
    ///
    /// Idempotent. If a staged commit fails, the temp file and its ledger
    /// entry are left in place and `done` may be retried.
    pub fn done(&mut self) -> StoreResult<ContentAddress> {
        let address = match &mut self.state {
            State::Committed(address) => return Ok(*address),
            State::Failed => return Err(StoreError::WriterClosed),
            State::Buffering(buf) => {
                let address = ContentAddress::from_digest(self.hasher.digest());
                self.store.commit_buffer(&address, buf)?;
                address
            }
            State::Staged { staging, file } => {
                if let Some(mut f) = file.take() {
                    let flushed = f.flush().and_then(|_| f.get_ref().sync_all());
                    if let Err(e) = flushed {
                        self.state = State::Failed;
                        return Err(e.into());
                    }
                }
                let address = ContentAddress::from_digest(self.hasher.digest());
                self.store.commit_staged(&address, staging)?;
                address
            }
        };
        self.state = State::Committed(address);
        Ok(address)
    }
}

impl Write for ContentWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        ContentWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for ContentWriter<'_> {
    fn drop(&mut self) {
        if let State::Staged { staging, .. } = &self.state {
            warn!(
                staging_id = staging.staging_id,
                path = %staging.temp_path.display(),
                "writer dropped before done; staging file left for sweep"
            );
        }
    }
}

impl std::fmt::Debug for ContentWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentWriter")
            .field("phase", &self.phase())
            .field("len", &self.len())
            .finish()
    }
}
