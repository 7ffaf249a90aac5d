//! `SQLite`-backed authoritative word collection

use std::path::Path;

use rusqlite::{params, params_from_iter, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Entry, Tombstone};
use crate::sync::{merge_delta, SyncRequest, SyncResponse, WordCollection};
use crate::timestamp::{self, Timestamp};

/// [`WordCollection`] stored in the `words` and `tombstones` tables.
///
/// Entries are kept as JSON next to sortable copies of `updatedAt` and of the
/// server time they were stored, so the delta queries run on the index.
pub struct SqliteCollection {
    db: Database,
}

impl SqliteCollection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Merge a device delta inside one transaction.
    pub fn merge(&mut self, request: &SyncRequest, now: Timestamp) -> Result<SyncResponse> {
        self.db.connection().execute_batch("BEGIN IMMEDIATE")?;
        match merge_delta(self, request, now) {
            Ok(response) => {
                if let Err(error) = self.db.connection().execute_batch("COMMIT") {
                    self.db.connection().execute_batch("ROLLBACK").ok();
                    return Err(error.into());
                }
                Ok(response)
            }
            Err(error) => {
                self.db.connection().execute_batch("ROLLBACK").ok();
                Err(error)
            }
        }
    }

    /// Number of live entries
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .connection()
            .query_row("SELECT COUNT(*) FROM words", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn query_entries(&self, sql: &str, since: Option<String>) -> Result<Vec<Entry>> {
        let mut stmt = self.db.connection().prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(since.iter()), |row| {
            row.get::<_, String>(0)
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(decode_entry(&row?)?);
        }
        Ok(entries)
    }
}

fn decode_entry(data: &str) -> Result<Entry> {
    serde_json::from_str(data)
        .map_err(|error| Error::Database(format!("stored entry is not valid JSON: {error}")))
}

fn decode_timestamp(value: &str) -> Result<Timestamp> {
    timestamp::parse(value)
        .ok_or_else(|| Error::Database(format!("stored timestamp '{value}' is invalid")))
}

impl WordCollection for SqliteCollection {
    fn get(&self, id: &str) -> Result<Option<Entry>> {
        let data: Option<String> = self
            .db
            .connection()
            .query_row("SELECT data FROM words WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        data.as_deref().map(decode_entry).transpose()
    }

    fn put(&mut self, entry: &Entry, stored_at: Timestamp) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        self.db.connection().execute(
            "INSERT INTO words (id, data, updated_at, stored_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                stored_at = excluded.stored_at",
            params![
                entry.id,
                data,
                timestamp::to_sortable(entry.modified_at()),
                timestamp::to_sortable(stored_at)
            ],
        )?;
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        let changed = self
            .db
            .connection()
            .execute("DELETE FROM words WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn put_tombstone(&mut self, tombstone: &Tombstone) -> Result<()> {
        self.db.connection().execute(
            "INSERT INTO tombstones (id, deleted_at) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET deleted_at = excluded.deleted_at",
            params![tombstone.id, timestamp::to_sortable(tombstone.deleted_at)],
        )?;
        Ok(())
    }

    fn clear_tombstone(&mut self, id: &str) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM tombstones WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn changed_since(&self, since: Option<Timestamp>) -> Result<Vec<Entry>> {
        match since {
            Some(since) => self.query_entries(
                "SELECT data FROM words WHERE stored_at > ?1 ORDER BY updated_at DESC, id ASC",
                Some(timestamp::to_sortable(since)),
            ),
            None => self.query_entries(
                "SELECT data FROM words ORDER BY updated_at DESC, id ASC",
                None,
            ),
        }
    }

    fn tombstones_since(&self, since: Timestamp) -> Result<Vec<Tombstone>> {
        let mut stmt = self.db.connection().prepare(
            "SELECT id, deleted_at FROM tombstones WHERE deleted_at > ?1 ORDER BY deleted_at ASC",
        )?;
        let rows = stmt.query_map(params![timestamp::to_sortable(since)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut tombstones = Vec::new();
        for row in rows {
            let (id, deleted_at) = row?;
            tombstones.push(Tombstone::new(id, decode_timestamp(&deleted_at)?));
        }
        Ok(tombstones)
    }
}
