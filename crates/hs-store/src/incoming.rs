//! Staging area for writes that outgrow the in-memory buffer.
//!
//! Every staged write gets a row in `incoming.db` and a temp file
//! `incoming/<id>.tmp`. The row is resolved once the temp file has been
//! moved into place or discarded as a duplicate. Rows left unresolved after
//! a crash or an abandoned writer identify orphaned temp files.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hs_types::ContentAddress;

use crate::error::StoreResult;
use crate::shard_db::{from_millis, now_millis, open_connection};

pub const INCOMING_DIR: &str = "incoming";
pub const INCOMING_DB_FILE: &str = "incoming.db";

/// Ledger entry for one staged write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingFile {
    pub staging_id: i64,
    pub temp_path: PathBuf,
    /// Set once the write has been committed or discarded.
    pub final_address: Option<ContentAddress>,
    pub created_at: DateTime<Utc>,
}

impl StagingFile {
    pub fn is_resolved(&self) -> bool {
        self.final_address.is_some()
    }
}

/// Outcome of [`StagingLedger::sweep_orphans`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub entries_removed: usize,
    pub files_removed: usize,
    /// Resolved entries pruned from the ledger.
    pub resolved_pruned: usize,
}

/// Process-wide ledger of staged writes.
#[derive(Debug)]
pub struct StagingLedger {
    dir: PathBuf,
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl StagingLedger {
    /// Open the ledger under `root`, creating the staging directory and database.
    pub fn open(root: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        let ledger = Self {
            dir: root.join(INCOMING_DIR),
            db_path: root.join(INCOMING_DB_FILE),
            busy_timeout,
        };
        fs::create_dir_all(&ledger.dir)?;
        ledger.connection()?;
        Ok(ledger)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn connection(&self) -> StoreResult<Connection> {
        let conn = open_connection(&self.db_path, self.busy_timeout)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS incoming (
                incoming_id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                resolved_at INTEGER,
                new INTEGER,
                address TEXT
            );
            "#,
        )?;
        Ok(conn)
    }

    fn temp_path(&self, staging_id: i64) -> PathBuf {
        self.dir.join(format!("{staging_id}.tmp"))
    }

    /// Record a new staged write and create its temp file.
    pub fn begin(&self) -> StoreResult<(StagingFile, File)> {
        let conn = self.connection()?;
        let created = now_millis();
        conn.execute(
            "INSERT INTO incoming (created_at) VALUES (?1)",
            params![created],
        )?;
        let staging_id = conn.last_insert_rowid();
        let temp_path = self.temp_path(staging_id);
        let file = File::create(&temp_path)?;
        debug!(staging_id, path = %temp_path.display(), "staging file opened");
        Ok((
            StagingFile {
                staging_id,
                temp_path,
                final_address: None,
                created_at: from_millis(created),
            },
            file,
        ))
    }

    /// Mark a staged write resolved. `new` records whether it created a blob.
    pub fn resolve(&self, staging_id: i64, address: &ContentAddress, new: bool) -> StoreResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE incoming SET resolved_at = ?1, new = ?2, address = ?3 WHERE incoming_id = ?4",
            params![now_millis(), new, address.to_string(), staging_id],
        )?;
        Ok(())
    }

    /// Staged writes that were never resolved, oldest first.
    pub fn unresolved(&self) -> StoreResult<Vec<StagingFile>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT incoming_id, created_at FROM incoming \
             WHERE resolved_at IS NULL ORDER BY incoming_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|(staging_id, created)| StagingFile {
                staging_id,
                temp_path: self.temp_path(staging_id),
                final_address: None,
                created_at: from_millis(created),
            })
            .collect())
    }

    /// Delete unresolved entries older than `grace` together with their temp
    /// files, and prune entries resolved more than `grace` ago.
    pub fn sweep_orphans(&self, grace: Duration) -> StoreResult<SweepReport> {
        let grace_millis = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(grace_millis);
        let mut report = SweepReport::default();

        for orphan in self.unresolved()? {
            if orphan.created_at.timestamp_millis() > cutoff {
                continue;
            }
            match fs::remove_file(&orphan.temp_path) {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            let conn = self.connection()?;
            conn.execute(
                "DELETE FROM incoming WHERE incoming_id = ?1",
                params![orphan.staging_id],
            )?;
            report.entries_removed += 1;
            warn!(staging_id = orphan.staging_id, "removed orphaned staging file");
        }

        let conn = self.connection()?;
        report.resolved_pruned = conn.execute(
            "DELETE FROM incoming WHERE resolved_at IS NOT NULL AND resolved_at <= ?1",
            params![cutoff],
        )?;

        if report.entries_removed > 0 || report.resolved_pruned > 0 {
            info!(
                entries = report.entries_removed,
                files = report.files_removed,
                pruned = report.resolved_pruned,
                "staging sweep complete"
            );
        }
        Ok(report)
    }
}
