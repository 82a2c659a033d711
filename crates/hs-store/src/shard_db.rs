//! Embedded-database tier: one SQLite file per shard.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use hs_types::ContentAddress;

use crate::error::StoreResult;

pub const SHARD_DB_FILE: &str = "blob.db";

/// Handle on the `blob.db` of one shard directory.
///
/// Connections are opened per operation; the file is only created on the
/// first insert.
#[derive(Clone, Debug)]
pub struct ShardDb {
    path: PathBuf,
    busy_timeout: Duration,
}

pub(crate) fn open_connection(path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

impl ShardDb {
    pub fn new(shard_dir: &Path, busy_timeout: Duration) -> Self {
        Self {
            path: shard_dir.join(SHARD_DB_FILE),
            busy_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn connection(&self) -> StoreResult<Connection> {
        let conn = open_connection(&self.path, self.busy_timeout)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blob (
                address TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(conn)
    }

    /// Content and creation time of the row for `address`.
    pub fn get(&self, address: &ContentAddress) -> StoreResult<Option<(Vec<u8>, DateTime<Utc>)>> {
        if !self.exists() {
            return Ok(None);
        }
        let conn = self.connection()?;
        let row = conn
            .query_row(
                "SELECT content, created_at FROM blob WHERE address = ?1",
                params![address.to_filename()],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(content, created)| (content, from_millis(created))))
    }

    pub fn contains(&self, address: &ContentAddress) -> StoreResult<bool> {
        if !self.exists() {
            return Ok(false);
        }
        let conn = self.connection()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM blob WHERE address = ?1",
                params![address.to_filename()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a row unless one exists. Returns `true` if a row was created.
    pub fn insert(&self, address: &ContentAddress, content: &[u8]) -> StoreResult<bool> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = self.connection()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO blob (address, content, created_at) VALUES (?1, ?2, ?3)",
            params![address.to_filename(), content, now_millis()],
        )?;
        Ok(changed == 1)
    }

    pub fn delete(&self, address: &ContentAddress) -> StoreResult<bool> {
        if !self.exists() {
            return Ok(false);
        }
        let conn = self.connection()?;
        let changed = conn.execute(
            "DELETE FROM blob WHERE address = ?1",
            params![address.to_filename()],
        )?;
        Ok(changed == 1)
    }

    /// Every address with a row in this shard. Unparseable rows are skipped.
    pub fn addresses(&self) -> StoreResult<Vec<ContentAddress>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT address FROM blob ORDER BY address")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names
            .into_iter()
            .filter_map(|name| match name.parse() {
                Ok(address) => Some(address),
                Err(err) => {
                    warn!(db = %self.path.display(), %name, %err, "skipping malformed blob row");
                    None
                }
            })
            .collect())
    }
}
