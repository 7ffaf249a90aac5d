//! Device-side sync client
//!
//! Owns the local entry store and the sync state for one device and runs
//! sync cycles against a [`SyncTransport`]. A cycle snapshots the outgoing
//! delta under the replica lock, releases the lock while the request is in
//! flight, and applies the response once it arrives. Local mutations may
//! interleave with an in-flight request; they are picked up by the next cycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use super::protocol::{SyncRequest, SyncResponse};
use super::resolve::{merge_entries, Resolution};
use super::transport::{SyncError, SyncTransport};
use crate::error::{Error, Result};
use crate::models::{Conflict, ConflictKind, Entry, SyncState};
use crate::store::{EntryStore, KeyValueStore, PersistReport};
use crate::timestamp::{self, Timestamp};
use crate::util::short_id;

/// Outcome of one successful cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries sent to the server
    pub sent: usize,
    /// Pending deletions sent to the server
    pub sent_deletions: usize,
    /// Remote entries written locally
    pub accepted: usize,
    /// Local entries removed because the server deleted them
    pub removed: usize,
    /// Conflicts surfaced by this cycle, awaiting a user decision
    pub conflicts: Vec<Conflict>,
    /// New watermark
    pub server_time: Timestamp,
    /// Anything the degradation ladder discarded since the last report
    pub data_loss: Option<PersistReport>,
}

impl SyncReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

struct Replica<K> {
    store: EntryStore<K>,
    state: SyncState,
    in_flight: bool,
    /// Ids mutated locally while a request was in flight
    touched: HashSet<String>,
}

pub struct SyncClient<K, T> {
    replica: Mutex<Replica<K>>,
    transport: T,
    cycle: Mutex<()>,
    halted: AtomicBool,
}

impl<K, T> SyncClient<K, T>
where
    K: KeyValueStore + Send,
    T: SyncTransport,
{
    /// Load the device's sync state and entries from `kv`.
    pub fn open(mut kv: K, transport: T) -> Result<Self> {
        let state = SyncState::load_or_init(&mut kv)?;
        let store = EntryStore::load(kv, state.client_id.clone())?;
        tracing::debug!(
            client = %short_id(&state.client_id),
            entries = store.len(),
            last_sync_at = ?state.last_sync_at,
            "Opened sync client"
        );
        Ok(Self {
            replica: Mutex::new(Replica {
                store,
                state,
                in_flight: false,
                touched: HashSet::new(),
            }),
            transport,
            cycle: Mutex::new(()),
            halted: AtomicBool::new(false),
        })
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// All local entries, newest first
    pub async fn entries(&self) -> Vec<Entry> {
        self.replica.lock().await.store.get().to_vec()
    }

    pub async fn entry(&self, id: &str) -> Option<Entry> {
        self.replica.lock().await.store.find(id).cloned()
    }

    /// Up to `limit` entry ids starting with `prefix`
    pub async fn ids_with_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.replica.lock().await.store.ids_with_prefix(prefix, limit)
    }

    /// Snapshot of the sync state
    pub async fn state(&self) -> SyncState {
        self.replica.lock().await.state.clone()
    }

    /// Conflicts still awaiting a decision
    pub async fn conflicts(&self) -> Vec<Conflict> {
        self.replica.lock().await.state.outstanding_conflicts.clone()
    }

    /// Data the degradation ladder discarded since the last call
    pub async fn take_data_loss(&self) -> Option<PersistReport> {
        self.replica.lock().await.store.take_data_loss()
    }

    /// Create or edit an entry locally.
    /// Fails with [`Error::CapacityExceeded`] when local storage had to drop
    /// the entry to fit.
    pub async fn upsert(&self, entry: Entry) -> Result<Entry> {
        entry.validate().map_err(Error::InvalidInput)?;
        let id = entry.id.clone();
        let mut replica = self.replica.lock().await;
        replica.upsert(entry)?.ok_or_else(|| {
            Error::CapacityExceeded(format!("entry '{id}' did not fit in local storage"))
        })
    }

    /// Delete an entry locally and queue the deletion for the server.
    /// Returns whether the entry existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut replica = self.replica.lock().await;
        if !replica.store.delete(id)? {
            return Ok(false);
        }
        if replica.in_flight {
            replica.touched.insert(id.to_string());
        }
        replica.state.mark_deleted(id);
        replica.save_state()?;
        Ok(true)
    }

    /// Apply the user's decision for the outstanding conflict on `id`.
    /// Returns the resulting local entry, if one remains.
    pub async fn resolve(&self, id: &str, resolution: Resolution) -> Result<Option<Entry>> {
        let mut replica = self.replica.lock().await;
        let conflict = replica
            .state
            .conflict(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no outstanding conflict for '{id}'")))?;

        let result = match (conflict.kind, resolution) {
            (ConflictKind::Delete, Resolution::Merge) => {
                return Err(Error::InvalidInput(
                    "merge only applies to update conflicts".to_string(),
                ));
            }
            (_, Resolution::KeepRemote) => {
                if conflict.is_delete() {
                    replica.state.unmark_deleted(id);
                }
                match conflict.remote {
                    Some(remote) => {
                        replica.store.apply_remote(remote.clone())?;
                        Some(remote)
                    }
                    None => {
                        replica.store.delete(id)?;
                        None
                    }
                }
            }
            (ConflictKind::Update, Resolution::KeepLocal) => {
                match replica.store.find(id).cloned().or(conflict.local) {
                    Some(local) => replica.upsert(local)?,
                    None => None,
                }
            }
            (ConflictKind::Delete, Resolution::KeepLocal) => {
                replica.store.delete(id)?;
                replica.state.mark_deleted(id);
                None
            }
            (ConflictKind::Update, Resolution::Merge) => {
                let local = replica.store.find(id).cloned().or(conflict.local);
                let (Some(local), Some(remote)) = (local, conflict.remote.as_ref()) else {
                    return Err(Error::InvalidInput(format!(
                        "conflict for '{id}' lacks a side to merge"
                    )));
                };
                let merged = merge_entries(&local, remote);
                replica.upsert(merged)?
            }
        };

        replica.state.take_conflict(id);
        replica.save_state()?;
        tracing::info!(
            id = %short_id(id),
            kind = %conflict.kind,
            resolution = %resolution,
            "Resolved sync conflict"
        );
        Ok(result)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Clear the halt left by an authorization failure.
    pub fn resume(&self) {
        if self.halted.swap(false, Ordering::SeqCst) {
            tracing::info!("Sync resumed");
        }
    }

    /// Run one sync cycle.
    pub async fn sync(&self) -> std::result::Result<SyncReport, SyncError> {
        if self.is_halted() {
            return Err(SyncError::Halted);
        }
        let Ok(_cycle) = self.cycle.try_lock() else {
            return Err(SyncError::InFlight);
        };

        let request = {
            let mut replica = self.replica.lock().await;
            replica.in_flight = true;
            replica.touched.clear();
            replica.request()
        };
        tracing::debug!(
            since = ?request.since,
            entries = request.entries.len(),
            deleted = request.deleted_ids.len(),
            "Sending sync delta"
        );

        let result = self.transport.push(&request).await;

        let mut replica = self.replica.lock().await;
        replica.in_flight = false;
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                replica.touched.clear();
                if matches!(error, SyncError::Unauthorized) {
                    self.halted.store(true, Ordering::SeqCst);
                    tracing::error!("Sync token rejected; halting sync until reconfigured");
                } else {
                    tracing::warn!(error = %error, "Sync cycle failed");
                }
                return Err(error);
            }
        };

        let report = replica.apply(&request, response)?;
        tracing::info!(
            sent = report.sent,
            sent_deletions = report.sent_deletions,
            accepted = report.accepted,
            removed = report.removed,
            conflicts = report.conflicts.len(),
            "Sync cycle complete"
        );
        Ok(report)
    }
}

impl<K: KeyValueStore> Replica<K> {
    /// Pending deletions with an outstanding conflict stay local until the
    /// user resolves it.
    fn request(&self) -> SyncRequest {
        let since = self.state.last_sync_at;
        SyncRequest {
            client_id: self.state.client_id.clone(),
            since,
            entries: self.store.changed_since(since),
            deleted_ids: self
                .state
                .pending_deleted_ids
                .iter()
                .filter(|id| self.state.conflict(id).is_none())
                .cloned()
                .collect(),
        }
    }

    fn upsert(&mut self, entry: Entry) -> Result<Option<Entry>> {
        let id = entry.id.clone();
        let at = timestamp::stamp_after(timestamp::now(), self.state.last_sync_at);
        let stored = self.store.upsert_at(entry, at)?;
        if self.in_flight {
            self.touched.insert(id);
        }
        Ok(stored)
    }

    fn apply(&mut self, request: &SyncRequest, response: SyncResponse) -> Result<SyncReport> {
        let since = request.since;
        let SyncResponse {
            entries,
            deleted_ids,
            server_time,
            conflicts,
        } = response;

        let blocked = |kind: ConflictKind| -> HashSet<String> {
            conflicts
                .iter()
                .chain(&self.state.outstanding_conflicts)
                .filter(|conflict| conflict.kind == kind)
                .map(|conflict| conflict.id.clone())
                .collect()
        };
        let update_blocked = blocked(ConflictKind::Update);
        let delete_blocked = blocked(ConflictKind::Delete);
        let fresh: HashSet<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();

        let mut accepted = Vec::new();
        let mut refreshed = Vec::new();
        for remote in entries {
            if update_blocked.contains(&remote.id) {
                if !fresh.contains(remote.id.as_str()) {
                    refreshed.push(remote);
                }
                continue;
            }
            let newer = self
                .store
                .find(&remote.id)
                .map_or(true, |local| remote.is_newer_than(local));
            if newer {
                if delete_blocked.contains(&remote.id) && !fresh.contains(remote.id.as_str()) {
                    refreshed.push(remote.clone());
                }
                accepted.push(remote);
            }
        }

        let removed: Vec<String> = deleted_ids
            .iter()
            .filter(|id| !delete_blocked.contains(*id))
            .filter(|id| {
                self.store
                    .find(id)
                    .is_some_and(|local| since.is_none() || !local.changed_since(since))
            })
            .cloned()
            .collect();

        let accepted_count = accepted.len();
        self.store.apply_changes(accepted, &removed)?;

        let returned: HashSet<&str> = deleted_ids.iter().map(String::as_str).collect();
        self.state
            .pending_deleted_ids
            .retain(|id| !returned.contains(id.as_str()) || delete_blocked.contains(id));

        if let Some(previous) = self.state.last_sync_at {
            if server_time < previous {
                tracing::warn!(
                    previous = %previous,
                    server_time = %server_time,
                    "Server time moved behind the local watermark"
                );
            }
        }
        self.state.last_sync_at = Some(server_time);

        for remote in refreshed {
            if let Some(conflict) = self
                .state
                .outstanding_conflicts
                .iter_mut()
                .find(|conflict| conflict.id == remote.id)
            {
                conflict.remote = Some(remote);
            }
        }
        self.state.record_conflicts(&conflicts);

        self.restamp_touched(server_time)?;
        self.save_state()?;

        Ok(SyncReport {
            sent: request.entries.len(),
            sent_deletions: request.deleted_ids.len(),
            accepted: accepted_count,
            removed: removed.len(),
            conflicts,
            server_time,
            data_loss: self.store.take_data_loss(),
        })
    }

    /// Entries edited while the request was in flight must stay ahead of the
    /// new watermark or the next cycle would never send them.
    fn restamp_touched(&mut self, watermark: Timestamp) -> Result<()> {
        let touched = std::mem::take(&mut self.touched);
        for id in touched {
            let Some(entry) = self.store.find(&id) else {
                continue;
            };
            if entry.changed_since(Some(watermark)) {
                continue;
            }
            let entry = entry.clone();
            let at = timestamp::stamp_after(timestamp::now(), Some(watermark));
            self.store.upsert_at(entry, at)?;
        }
        Ok(())
    }

    /// Persist the sync state, reclaiming entry storage when the write does
    /// not fit.
    fn save_state(&mut self) -> Result<()> {
        loop {
            match self.state.save(self.store.kv_mut()) {
                Ok(()) => return Ok(()),
                Err(error) if error.is_capacity_exceeded() => {
                    if !self.store.reclaim()? {
                        tracing::error!("Sync state does not fit in local storage");
                        return Err(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;
    use crate::sync::{LocalTransport, WordCollection};
    use crate::timestamp::parse;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    type Client = SyncClient<MemoryKeyValueStore, LocalTransport>;

    fn device(transport: &LocalTransport) -> Client {
        SyncClient::open(MemoryKeyValueStore::new(), transport.device()).unwrap()
    }

    /// Answers each push with the next queued response and records requests.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: std::sync::Mutex<VecDeque<SyncResponse>>,
        requests: std::sync::Mutex<Vec<SyncRequest>>,
    }

    impl ScriptedTransport {
        fn answer(&self, response: SyncResponse) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn last_request(&self) -> SyncRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl SyncTransport for ScriptedTransport {
        async fn push(&self, request: &SyncRequest) -> std::result::Result<SyncResponse, SyncError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SyncError::Transport("no response queued".to_string()))
        }
    }

    fn scripted() -> SyncClient<MemoryKeyValueStore, ScriptedTransport> {
        SyncClient::open(MemoryKeyValueStore::new(), ScriptedTransport::default()).unwrap()
    }

    fn answer(server_time: Timestamp) -> SyncResponse {
        SyncResponse {
            entries: Vec::new(),
            deleted_ids: Vec::new(),
            server_time,
            conflicts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_written_through_before_sync() {
        let client = device(&LocalTransport::new());
        let stored = client.upsert(Entry::with_id("e1", "Hund", "dog")).await.unwrap();

        assert!(stored.updated_at.is_some());
        assert_eq!(client.entry("e1").await, Some(stored));
        assert_eq!(client.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_blank_id() {
        let client = device(&LocalTransport::new());
        let result = client.upsert(Entry::with_id(" ", "Hund", "dog")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_upsert_stamps_after_watermark_when_clock_lags() {
        let server = LocalTransport::new();
        let client = device(&server);
        client.sync().await.unwrap();

        let watermark = client.state().await.last_sync_at.unwrap();
        let stored = client.upsert(Entry::with_id("e1", "Hund", "dog")).await.unwrap();
        assert!(stored.updated_at.unwrap() > watermark);
    }

    #[tokio::test]
    async fn test_failed_cycle_leaves_state_untouched() {
        let server = LocalTransport::new();
        let client = device(&server);
        client.upsert(Entry::with_id("e1", "Hund", "dog")).await.unwrap();
        client.delete("e1").await.unwrap();
        let before = client.state().await;

        server.fail_next(SyncError::Transport("connection reset".to_string()));
        let result = client.sync().await;

        assert!(matches!(result, Err(SyncError::Transport(_))));
        assert_eq!(client.state().await, before);
        assert!(!client.is_halted());
    }

    #[tokio::test]
    async fn test_unauthorized_halts_until_resumed() {
        let server = LocalTransport::new();
        let client = device(&server);

        server.fail_next(SyncError::Unauthorized);
        assert!(matches!(client.sync().await, Err(SyncError::Unauthorized)));
        assert!(client.is_halted());
        assert!(matches!(client.sync().await, Err(SyncError::Halted)));
        assert_eq!(server.calls(), 1);

        client.resume();
        client.sync().await.unwrap();
        assert_eq!(server.calls(), 2);
    }

    #[tokio::test]
    async fn test_second_cycle_while_in_flight_is_refused() {
        let server = LocalTransport::new();
        let client = std::sync::Arc::new(device(&server));
        let gate = server.hold().await;

        let first = tokio::spawn({
            let client = std::sync::Arc::clone(&client);
            async move { client.sync().await }
        });
        while server.calls() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(client.sync().await, Err(SyncError::InFlight)));
        drop(gate);
        first.await.unwrap().unwrap();
        assert_eq!(server.calls(), 1);
    }

    #[tokio::test]
    async fn test_edit_during_flight_is_sent_next_cycle() {
        let server = LocalTransport::new();
        let client = std::sync::Arc::new(device(&server));
        client.upsert(Entry::with_id("e1", "Hund", "dog")).await.unwrap();
        let gate = server.hold().await;

        let first = tokio::spawn({
            let client = std::sync::Arc::clone(&client);
            async move { client.sync().await }
        });
        while server.calls() == 0 {
            tokio::task::yield_now().await;
        }
        client
            .upsert(Entry::with_id("e2", "Katze", "cat"))
            .await
            .unwrap();
        drop(gate);
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.sent, 1);

        let watermark = client.state().await.last_sync_at.unwrap();
        let e2 = client.entry("e2").await.unwrap();
        assert!(e2.updated_at.unwrap() > watermark);

        let report = client.sync().await.unwrap();
        assert_eq!(report.sent, 1);
        let collection = server.collection();
        assert!(collection.lock().await.get("e2").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_conflict_is_kept_outstanding_and_resolved() {
        let server = LocalTransport::new();
        let a = device(&server);
        let b = device(&server);

        a.upsert(Entry::with_id("x", "Hund", "dog")).await.unwrap();
        a.sync().await.unwrap();
        b.sync().await.unwrap();

        a.upsert(Entry::with_id("x", "Hund", "hound")).await.unwrap();
        b.upsert(Entry::with_id("x", "Hund", "doggo")).await.unwrap();
        a.sync().await.unwrap();
        let report = b.sync().await.unwrap();

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind, ConflictKind::Update);
        assert_eq!(b.entry("x").await.unwrap().english, "doggo");
        assert_eq!(b.conflicts().await.len(), 1);

        let resolved = b.resolve("x", Resolution::KeepRemote).await.unwrap();
        assert_eq!(resolved.unwrap().english, "hound");
        assert_eq!(b.entry("x").await.unwrap().english, "hound");
        assert!(b.conflicts().await.is_empty());
    }

    #[tokio::test]
    async fn test_keep_local_wins_the_next_cycle() {
        let server = LocalTransport::new();
        let a = device(&server);
        let b = device(&server);

        a.upsert(Entry::with_id("x", "Hund", "dog")).await.unwrap();
        a.sync().await.unwrap();
        b.sync().await.unwrap();
        a.upsert(Entry::with_id("x", "Hund", "hound")).await.unwrap();
        b.upsert(Entry::with_id("x", "Hund", "doggo")).await.unwrap();
        a.sync().await.unwrap();
        b.sync().await.unwrap();

        b.resolve("x", Resolution::KeepLocal).await.unwrap();
        let report = b.sync().await.unwrap();
        assert!(report.conflicts.is_empty());

        let collection = server.collection();
        let stored = collection.lock().await.get("x").unwrap().unwrap();
        assert_eq!(stored.english, "doggo");
    }

    #[tokio::test]
    async fn test_merge_combines_fields() {
        let server = LocalTransport::new();
        let a = device(&server);
        let b = device(&server);

        a.upsert(Entry::with_id("x", "Hund", "dog")).await.unwrap();
        a.sync().await.unwrap();
        b.sync().await.unwrap();

        let mut edit_a = Entry::with_id("x", "Hund", "dog");
        edit_a.notes = Some("plural: Hunde".to_string());
        a.upsert(edit_a).await.unwrap();
        let mut edit_b = Entry::with_id("x", "Hund", "dog");
        edit_b.part_of_speech = Some("noun".to_string());
        b.upsert(edit_b).await.unwrap();
        a.sync().await.unwrap();
        b.sync().await.unwrap();

        let merged = b.resolve("x", Resolution::Merge).await.unwrap().unwrap();
        assert_eq!(merged.part_of_speech.as_deref(), Some("noun"));
        assert_eq!(merged.notes.as_deref(), Some("plural: Hunde"));
        assert!(merged.updated_at > b.state().await.last_sync_at);
    }

    #[tokio::test]
    async fn test_delete_conflict_keeps_pending_until_resolved() {
        let server = LocalTransport::new();
        let a = device(&server);
        let b = device(&server);

        a.upsert(Entry::with_id("y", "Katze", "cat")).await.unwrap();
        a.sync().await.unwrap();
        b.sync().await.unwrap();

        a.delete("y").await.unwrap();
        b.upsert(Entry::with_id("y", "Katze", "kitty")).await.unwrap();
        b.sync().await.unwrap();
        let report = a.sync().await.unwrap();

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind, ConflictKind::Delete);
        assert!(a.state().await.pending_deleted_ids.contains("y"));
        assert_eq!(a.entry("y").await.unwrap().english, "kitty");

        let merge = a.resolve("y", Resolution::Merge).await;
        assert!(matches!(merge, Err(Error::InvalidInput(_))));

        a.resolve("y", Resolution::KeepRemote).await.unwrap();
        assert_eq!(a.entry("y").await.unwrap().english, "kitty");
        assert!(a.state().await.pending_deleted_ids.is_empty());
        assert!(a.conflicts().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_conflict_keep_local_deletes_next_cycle() {
        let server = LocalTransport::new();
        let a = device(&server);
        let b = device(&server);

        a.upsert(Entry::with_id("y", "Katze", "cat")).await.unwrap();
        a.sync().await.unwrap();
        b.sync().await.unwrap();
        a.delete("y").await.unwrap();
        b.upsert(Entry::with_id("y", "Katze", "kitty")).await.unwrap();
        b.sync().await.unwrap();
        a.sync().await.unwrap();

        a.resolve("y", Resolution::KeepLocal).await.unwrap();
        assert!(a.entry("y").await.is_none());
        let report = a.sync().await.unwrap();

        assert!(report.conflicts.is_empty());
        assert!(a.state().await.pending_deleted_ids.is_empty());
        let collection = server.collection();
        assert!(collection.lock().await.get("y").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_without_conflict_is_not_found() {
        let client = device(&LocalTransport::new());
        let result = client.resolve("nope", Resolution::KeepLocal).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remote_entry_older_than_local_is_ignored() {
        let server = LocalTransport::new();
        let client = device(&server);
        let old = parse("2020-01-01T00:00:00Z").unwrap();
        {
            let collection = server.collection();
            let mut collection = collection.lock().await;
            collection
                .put(
                    &Entry::with_id("e1", "alt", "old").updated(old),
                    old,
                )
                .unwrap();
        }
        let local = client.upsert(Entry::with_id("e1", "neu", "new")).await.unwrap();

        let report = client.sync().await.unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(client.entry("e1").await, Some(local));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let server = LocalTransport::new();
        let client = device(&server);
        client.upsert(Entry::with_id("e1", "Hund", "dog")).await.unwrap();
        client.sync().await.unwrap();
        let state = client.state().await;

        let kv = client.replica.lock().await.store.kv().clone();
        let reopened: Client = SyncClient::open(kv, server.device()).unwrap();
        assert_eq!(reopened.state().await, state);
        assert_eq!(reopened.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_deletion_spares_local_edit_after_watermark() {
        let client = scripted();
        client.upsert(Entry::with_id("old", "alt", "old")).await.unwrap();
        let watermark = timestamp::now() + chrono::Duration::hours(1);
        client.transport().answer(answer(watermark));
        client.sync().await.unwrap();

        let fresh = client.upsert(Entry::with_id("fresh", "neu", "new")).await.unwrap();
        assert!(fresh.changed_since(Some(watermark)));
        let mut deletion = answer(watermark + chrono::Duration::minutes(1));
        deletion.deleted_ids = vec!["old".to_string(), "fresh".to_string()];
        client.transport().answer(deletion);
        let report = client.sync().await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(client.entry("old").await, None);
        assert_eq!(client.entry("fresh").await, Some(fresh));
    }

    #[tokio::test]
    async fn test_remote_deletion_skips_entry_under_delete_conflict() {
        let client = scripted();
        let t1 = parse("2024-05-01T10:00:00Z").unwrap();
        let t2 = parse("2024-05-01T11:00:00Z").unwrap();
        let t3 = parse("2024-05-01T12:00:00Z").unwrap();
        client.transport().answer(answer(t1));
        client.sync().await.unwrap();

        client.upsert(Entry::with_id("y", "Katze", "cat")).await.unwrap();
        assert!(client.delete("y").await.unwrap());
        let remote = Entry::with_id("y", "Katze", "kitty").updated(t1);
        let mut conflicted = answer(t2);
        conflicted.entries = vec![remote.clone()];
        conflicted.conflicts = vec![Conflict::delete(remote.clone())];
        client.transport().answer(conflicted);
        client.sync().await.unwrap();
        assert_eq!(client.transport().last_request().deleted_ids, vec!["y".to_string()]);
        assert_eq!(client.entry("y").await, Some(remote.clone()));

        let mut tombstone = answer(t3);
        tombstone.deleted_ids = vec!["y".to_string()];
        client.transport().answer(tombstone);
        let report = client.sync().await.unwrap();

        assert!(client.transport().last_request().deleted_ids.is_empty());
        assert_eq!(report.sent_deletions, 0);
        assert_eq!(report.removed, 0);
        assert_eq!(client.entry("y").await, Some(remote));
        assert_eq!(client.conflicts().await.len(), 1);
        assert!(client.state().await.pending_deleted_ids.contains("y"));
    }
}
