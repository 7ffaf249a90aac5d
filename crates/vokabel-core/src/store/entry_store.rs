//! Local entry store
//!
//! Holds this device's entries in memory, newest first, and writes every
//! mutation through to a [`KeyValueStore`]. A write that does not fit walks
//! the [`Degradation`] ladder; whatever the ladder discards is logged and
//! accumulated in a [`PersistReport`].

use std::array::IntoIter;
use std::iter::Peekable;

use super::degrade::{Degradation, PersistReport};
use super::kv::KeyValueStore;
use crate::error::Result;
use crate::models::Entry;
use crate::timestamp::{self, Timestamp};
use crate::util::short_id;

/// Key under which the entry list is stored
pub const ENTRIES_KEY: &str = "vokabel.entries";

pub struct EntryStore<K> {
    kv: K,
    client_id: String,
    entries: Vec<Entry>,
    data_loss: PersistReport,
}

impl<K: KeyValueStore> EntryStore<K> {
    /// Load the stored entries, stamping any that lack `updated_at`.
    pub fn load(kv: K, client_id: impl Into<String>) -> Result<Self> {
        let mut entries: Vec<Entry> = match kv.get(ENTRIES_KEY)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };

        let now = timestamp::now();
        let stamped = entries
            .iter_mut()
            .fold(0usize, |count, entry| count + usize::from(entry.stamp_if_missing(now)));

        let mut store = Self {
            kv,
            client_id: client_id.into(),
            entries: Vec::new(),
            data_loss: PersistReport::default(),
        };

        if stamped > 0 {
            tracing::debug!(stamped, "Stamped entries without updatedAt on load");
            store.commit(entries)?;
        } else {
            store.entries = entries;
        }
        Ok(store)
    }

    /// All entries, newest first
    pub fn get(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry by id
    pub fn find(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Device id stamped onto local mutations
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Ids starting with `prefix`, at most `limit` of them
    pub fn ids_with_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.id.starts_with(prefix))
            .take(limit)
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Entries changed strictly after `since` (all of them without a watermark)
    pub fn changed_since(&self, since: Option<Timestamp>) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|entry| entry.changed_since(since))
            .cloned()
            .collect()
    }

    /// Local mutation stamped with the current time.
    pub fn upsert(&mut self, entry: Entry) -> Result<Option<Entry>> {
        self.upsert_at(entry, timestamp::now())
    }

    /// Local mutation stamped with `at` and this device's id. Returns the
    /// copy that was persisted, which the ladder may have stripped, or `None`
    /// when the entry had to be dropped.
    pub fn upsert_at(&mut self, mut entry: Entry, at: Timestamp) -> Result<Option<Entry>> {
        entry.updated_at = Some(at);
        entry.client_id = Some(self.client_id.clone());
        if entry.created_at.is_none() {
            entry.created_at = Some(at);
        }

        let id = entry.id.clone();
        let mut next = self.entries.clone();
        place(&mut next, entry);
        self.commit(next)?;
        Ok(self.find(&id).cloned())
    }

    /// Store a copy that arrived from the server, keeping its metadata.
    pub fn apply_remote(&mut self, entry: Entry) -> Result<()> {
        self.apply_changes(vec![entry], &[])
    }

    /// Apply remote copies and removals with a single write.
    pub fn apply_changes(&mut self, accepted: Vec<Entry>, removed: &[String]) -> Result<()> {
        if accepted.is_empty() && removed.is_empty() {
            return Ok(());
        }
        let mut next = self.entries.clone();
        next.retain(|entry| !removed.contains(&entry.id));
        for entry in accepted {
            place(&mut next, entry);
        }
        self.commit(next)
    }

    /// Remove an entry locally. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        if self.find(id).is_none() {
            return Ok(false);
        }
        let mut next = self.entries.clone();
        next.retain(|entry| entry.id != id);
        self.commit(next)?;
        Ok(true)
    }

    /// Free space by applying the first ladder step that still shrinks the
    /// current entries. Returns `false` when nothing is left to discard.
    pub fn reclaim(&mut self) -> Result<bool> {
        for step in Degradation::LADDER {
            if let Some(next) = step.apply(&self.entries) {
                self.write(&next)?;
                self.data_loss.merge(report_loss(step, &self.entries, &next));
                self.entries = next;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Data discarded by the ladder since the last call
    pub fn take_data_loss(&mut self) -> Option<PersistReport> {
        if self.data_loss.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data_loss))
        }
    }

    /// Underlying key-value store, shared with the sync state
    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut K {
        &mut self.kv
    }

    /// Persist `candidate`, degrading it until it fits. The in-memory view
    /// only changes once a write succeeded.
    fn commit(&mut self, mut candidate: Vec<Entry>) -> Result<()> {
        let mut ladder = Degradation::LADDER.into_iter().peekable();
        loop {
            match self.write(&candidate) {
                Ok(()) => {
                    self.entries = candidate;
                    return Ok(());
                }
                Err(error) if error.is_capacity_exceeded() => {
                    let Some((step, next)) = next_step(&mut ladder, &candidate) else {
                        tracing::error!(
                            entries = candidate.len(),
                            "Local storage still full after every degradation step"
                        );
                        return Err(error);
                    };
                    self.data_loss.merge(report_loss(step, &candidate, &next));
                    candidate = next;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn write(&mut self, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            self.kv.remove(ENTRIES_KEY)
        } else {
            let payload = serde_json::to_string(entries)?;
            self.kv.set(ENTRIES_KEY, &payload)
        }
    }
}

fn report_loss(step: Degradation, before: &[Entry], after: &[Entry]) -> PersistReport {
    let mut report = PersistReport::default();
    report.record(step, before, after);
    tracing::warn!(
        step = step.label(),
        stripped_media = report.stripped_media.len(),
        dropped = report.dropped.len(),
        first_dropped = ?report.dropped.first().map(|id| short_id(id)),
        "Local storage full; discarding data to fit"
    );
    report
}

/// Replace the entry with the same id in place, or insert it at the front.
fn place(entries: &mut Vec<Entry>, entry: Entry) {
    if let Some(existing) = entries.iter_mut().find(|existing| existing.id == entry.id) {
        *existing = entry;
    } else {
        entries.insert(0, entry);
    }
}

fn next_step(
    ladder: &mut Peekable<IntoIter<Degradation, 3>>,
    candidate: &[Entry],
) -> Option<(Degradation, Vec<Entry>)> {
    while let Some(&step) = ladder.peek() {
        if let Some(next) = step.apply(candidate) {
            return Some((step, next));
        }
        ladder.next();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;
    use crate::timestamp::parse;
    use pretty_assertions::assert_eq;

    fn setup() -> EntryStore<MemoryKeyValueStore> {
        EntryStore::load(MemoryKeyValueStore::new(), "device-a").unwrap()
    }

    fn word(id: &str) -> Entry {
        let mut entry = Entry::with_id(id, "Wort", "word");
        entry.created_at = None;
        entry
    }

    fn ids(store: &EntryStore<MemoryKeyValueStore>) -> Vec<&str> {
        store.get().iter().map(|entry| entry.id.as_str()).collect()
    }

    #[test]
    fn test_upsert_stamps_local_mutation() {
        let mut store = setup();
        let at = parse("2024-05-01T10:00:00Z").unwrap();

        let stored = store
            .upsert_at(Entry::with_id("e1", "Hund", "dog"), at)
            .unwrap()
            .unwrap();

        assert_eq!(stored.updated_at, Some(at));
        assert_eq!(stored.client_id.as_deref(), Some("device-a"));
        assert_eq!(store.find("e1"), Some(&stored));
    }

    #[test]
    fn test_upsert_new_entries_go_first_and_updates_stay_in_place() {
        let mut store = setup();
        store.upsert(Entry::with_id("a", "a", "a")).unwrap();
        store.upsert(Entry::with_id("b", "b", "b")).unwrap();
        store.upsert(Entry::with_id("a", "a2", "a2")).unwrap();

        assert_eq!(ids(&store), vec!["b", "a"]);
        assert_eq!(store.find("a").unwrap().german, "a2");
    }

    #[test]
    fn test_apply_remote_keeps_metadata() {
        let mut store = setup();
        let at = parse("2024-05-01T10:00:00Z").unwrap();
        let mut remote = Entry::with_id("e1", "Hund", "dog").updated(at);
        remote.client_id = Some("device-b".to_string());

        store.apply_remote(remote.clone()).unwrap();
        assert_eq!(store.find("e1"), Some(&remote));
    }

    #[test]
    fn test_changes_survive_reload() {
        let mut store = setup();
        store.upsert(Entry::with_id("e1", "Hund", "dog")).unwrap();
        store.upsert(Entry::with_id("e2", "Katze", "cat")).unwrap();
        assert!(store.delete("e1").unwrap());
        assert!(!store.delete("missing").unwrap());

        let kv = store.kv().clone();
        let reloaded = EntryStore::load(kv, "device-a").unwrap();
        assert_eq!(reloaded.get(), store.get());
    }

    #[test]
    fn test_load_stamps_entries_missing_updated_at() {
        let mut kv = MemoryKeyValueStore::new();
        kv.set(ENTRIES_KEY, r#"[{"id":"e1","german":"Hund"}]"#)
            .unwrap();

        let store = EntryStore::load(kv, "device-a").unwrap();
        assert!(store.find("e1").unwrap().updated_at.is_some());

        let raw = store.kv().get(ENTRIES_KEY).unwrap().unwrap();
        assert!(!raw.contains(r#""updatedAt":null"#));
    }

    #[test]
    fn test_changed_since_is_strict() {
        let mut store = setup();
        let t1 = parse("2024-05-01T10:00:00Z").unwrap();
        let t2 = parse("2024-05-02T10:00:00Z").unwrap();
        store.upsert_at(Entry::with_id("a", "a", "a"), t1).unwrap();
        store.upsert_at(Entry::with_id("b", "b", "b"), t2).unwrap();

        assert_eq!(store.changed_since(None).len(), 2);
        let since_t1 = store.changed_since(Some(t1));
        assert_eq!(since_t1.len(), 1);
        assert_eq!(since_t1[0].id, "b");
        assert!(store.changed_since(Some(t2)).is_empty());
    }

    #[test]
    fn test_capacity_pressure_strips_media_first() {
        let mut store = EntryStore::load(MemoryKeyValueStore::with_quota(400), "device-a").unwrap();
        let mut entry = Entry::with_id("e1", "Hund", "dog");
        entry.image_url = Some(format!("data:image/png;base64,{}", "A".repeat(600)));

        let stored = store.upsert(entry).unwrap().unwrap();
        assert_eq!(stored.image_url, None);
        assert_eq!(stored.german, "Hund");
        assert_eq!(store.find("e1"), Some(&stored));

        let loss = store.take_data_loss().unwrap();
        assert_eq!(loss.stripped_media, vec!["e1".to_string()]);
        assert!(loss.dropped.is_empty());
        assert!(store.take_data_loss().is_none());
    }

    #[test]
    fn test_capacity_pressure_drops_oldest_entries() {
        let mut store = EntryStore::load(MemoryKeyValueStore::new(), "device-a").unwrap();
        for (index, day) in ["01", "02", "03"].iter().enumerate() {
            let at = parse(&format!("2024-05-{day}T00:00:00Z")).unwrap();
            store.upsert_at(word(&format!("e{index}")), at).unwrap();
        }
        let one_entry = serde_json::to_string(&store.get()[..1]).unwrap().len();
        store
            .kv_mut()
            .set_quota(Some(ENTRIES_KEY.len() + one_entry * 2 + 1));

        let stored = store
            .upsert_at(word("e3"), parse("2024-05-04T00:00:00Z").unwrap())
            .unwrap();

        assert_eq!(stored.map(|entry| entry.id), Some("e3".to_string()));
        assert_eq!(ids(&store), vec!["e3", "e2"]);
        let loss = store.take_data_loss().unwrap();
        assert_eq!(loss.dropped, vec!["e0".to_string(), "e1".to_string()]);
    }

    #[test]
    fn test_capacity_pressure_clears_when_nothing_fits() {
        let mut store = EntryStore::load(MemoryKeyValueStore::with_quota(8), "device-a").unwrap();

        let stored = store.upsert(Entry::with_id("e1", "Hund", "dog")).unwrap();

        assert_eq!(stored, None);
        assert!(store.is_empty());
        assert_eq!(store.kv().get(ENTRIES_KEY).unwrap(), None);
        let loss = store.take_data_loss().unwrap();
        assert_eq!(loss.dropped, vec!["e1".to_string()]);
    }

    #[test]
    fn test_reclaim_walks_ladder_until_empty() {
        let mut store = setup();
        store.upsert(Entry::with_id("a", "a", "a")).unwrap();
        store.upsert(Entry::with_id("b", "b", "b")).unwrap();

        assert!(store.reclaim().unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.reclaim().unwrap());
        assert!(store.is_empty());
        assert!(!store.reclaim().unwrap());
    }
}
