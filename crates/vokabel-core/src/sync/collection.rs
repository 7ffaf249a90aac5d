//! Authoritative word collection behind the server merge

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{Entry, Tombstone};
use crate::timestamp::{self, Timestamp};

/// Storage operations the merge algorithm needs from the shared collection
pub trait WordCollection {
    /// Live entry by id
    fn get(&self, id: &str) -> Result<Option<Entry>>;

    /// Insert or replace a live entry, recording the server time it was stored
    fn put(&mut self, entry: &Entry, stored_at: Timestamp) -> Result<()>;

    /// Remove a live entry. Returns whether it existed.
    fn remove(&mut self, id: &str) -> Result<bool>;

    /// Write or refresh a tombstone
    fn put_tombstone(&mut self, tombstone: &Tombstone) -> Result<()>;

    /// Drop the tombstone for a re-created id
    fn clear_tombstone(&mut self, id: &str) -> Result<()>;

    /// Live entries stored strictly after `since` (all without a watermark),
    /// newest `updatedAt` first
    fn changed_since(&self, since: Option<Timestamp>) -> Result<Vec<Entry>>;

    /// Tombstones written strictly after `since`
    fn tombstones_since(&self, since: Timestamp) -> Result<Vec<Tombstone>>;

    /// Every live entry, newest first
    fn all(&self) -> Result<Vec<Entry>> {
        self.changed_since(None)
    }
}

/// Newest first, ties broken by id so responses are deterministic.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        b.modified_at()
            .cmp(&a.modified_at())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// In-process collection used by [`super::LocalTransport`] and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    entries: BTreeMap<String, (Entry, Timestamp)>,
    tombstones: BTreeMap<String, Timestamp>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tombstone for `id`, if the entry was deleted
    pub fn tombstone(&self, id: &str) -> Option<Tombstone> {
        self.tombstones
            .get(id)
            .map(|deleted_at| Tombstone::new(id, *deleted_at))
    }
}

impl WordCollection for MemoryCollection {
    fn get(&self, id: &str) -> Result<Option<Entry>> {
        Ok(self.entries.get(id).map(|(entry, _)| entry.clone()))
    }

    fn put(&mut self, entry: &Entry, stored_at: Timestamp) -> Result<()> {
        self.entries
            .insert(entry.id.clone(), (entry.clone(), stored_at));
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        Ok(self.entries.remove(id).is_some())
    }

    fn put_tombstone(&mut self, tombstone: &Tombstone) -> Result<()> {
        self.tombstones
            .insert(tombstone.id.clone(), tombstone.deleted_at);
        Ok(())
    }

    fn clear_tombstone(&mut self, id: &str) -> Result<()> {
        self.tombstones.remove(id);
        Ok(())
    }

    fn changed_since(&self, since: Option<Timestamp>) -> Result<Vec<Entry>> {
        let mut changed: Vec<Entry> = self
            .entries
            .values()
            .filter(|(_, stored_at)| timestamp::changed_since(*stored_at, since))
            .map(|(entry, _)| entry.clone())
            .collect();
        sort_newest_first(&mut changed);
        Ok(changed)
    }

    fn tombstones_since(&self, since: Timestamp) -> Result<Vec<Tombstone>> {
        Ok(self
            .tombstones
            .iter()
            .filter(|(_, deleted_at)| timestamp::changed_since(**deleted_at, Some(since)))
            .map(|(id, deleted_at)| Tombstone::new(id.clone(), *deleted_at))
            .collect())
    }
}
