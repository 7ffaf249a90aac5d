//! `SQLite`-backed key-value store for a device

use std::path::Path;

use rusqlite::{params, ErrorCode, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};
use crate::store::KeyValueStore;

/// [`KeyValueStore`] over the `kv` table, with an optional byte quota
pub struct SqliteKeyValueStore {
    db: Database,
    quota_bytes: Option<usize>,
}

impl SqliteKeyValueStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub const fn new(db: Database) -> Self {
        Self {
            db,
            quota_bytes: None,
        }
    }

    /// Refuse writes once keys plus values exceed `quota_bytes`.
    #[must_use]
    pub const fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Bytes used by every key and value except `key`
    fn used_bytes_excluding(&self, key: &str) -> Result<usize> {
        let used: i64 = self.db.connection().query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM kv WHERE key != ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(used).unwrap_or(usize::MAX))
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .connection()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota_bytes {
            let projected = self.used_bytes_excluding(key)? + key.len() + value.len();
            if projected > quota {
                return Err(Error::CapacityExceeded(format!(
                    "writing '{key}' needs {projected} bytes, quota is {quota}"
                )));
            }
        }
        self.db
            .connection()
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|error| map_disk_full(error, key))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn map_disk_full(error: rusqlite::Error, key: &str) -> Error {
    match error {
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::DiskFull => {
            Error::CapacityExceeded(format!("database full while writing '{key}'"))
        }
        other => other.into(),
    }
}
