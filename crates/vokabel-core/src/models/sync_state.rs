//! Per-device sync state model

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Conflict;
use crate::timestamp::Timestamp;

/// Durable per-device record of how far this device is reconciled with the
/// server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Identity of this device, generated once
    pub client_id: String,
    /// Watermark; `None` until the first successful sync
    #[serde(default)]
    pub last_sync_at: Option<Timestamp>,
    /// Ids deleted locally and not yet acknowledged by the server
    #[serde(default)]
    pub pending_deleted_ids: BTreeSet<String>,
    /// Conflicts surfaced by earlier cycles that still await a decision
    #[serde(default)]
    pub outstanding_conflicts: Vec<Conflict>,
}

impl SyncState {
    /// Fresh state for a device that never synced.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client_id(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub const fn with_client_id(client_id: String) -> Self {
        Self {
            client_id,
            last_sync_at: None,
            pending_deleted_ids: BTreeSet::new(),
            outstanding_conflicts: Vec::new(),
        }
    }

    /// Remember a local deletion so the next cycle communicates it.
    pub fn mark_deleted(&mut self, id: impl Into<String>) {
        self.pending_deleted_ids.insert(id.into());
    }

    /// Forget a pending deletion (the user chose to keep the remote copy).
    pub fn unmark_deleted(&mut self, id: &str) -> bool {
        self.pending_deleted_ids.remove(id)
    }

    /// Add or refresh outstanding conflicts; a newer conflict for the same id
    /// replaces the older one.
    pub fn record_conflicts(&mut self, conflicts: &[Conflict]) {
        for conflict in conflicts {
            if let Some(existing) = self
                .outstanding_conflicts
                .iter_mut()
                .find(|existing| existing.id == conflict.id)
            {
                *existing = conflict.clone();
            } else {
                self.outstanding_conflicts.push(conflict.clone());
            }
        }
    }

    /// Outstanding conflict for `id`, if any.
    pub fn conflict(&self, id: &str) -> Option<&Conflict> {
        self.outstanding_conflicts
            .iter()
            .find(|conflict| conflict.id == id)
    }

    /// Remove and return the outstanding conflict for `id`.
    pub fn take_conflict(&mut self, id: &str) -> Option<Conflict> {
        let index = self
            .outstanding_conflicts
            .iter()
            .position(|conflict| conflict.id == id)?;
        Some(self.outstanding_conflicts.remove(index))
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entry;

    #[test]
    fn test_fresh_state_has_no_watermark() {
        let state = SyncState::new();
        assert!(state.last_sync_at.is_none());
        assert!(state.pending_deleted_ids.is_empty());
        assert!(!state.client_id.is_empty());
        assert_ne!(state.client_id, SyncState::new().client_id);
    }

    #[test]
    fn test_record_conflicts_replaces_by_id() {
        let mut state = SyncState::new();
        let first = Conflict::delete(Entry::with_id("e1", "Hund", "dog"));
        let second = Conflict::update(
            Entry::with_id("e1", "Hund", "hound"),
            Entry::with_id("e1", "Hund", "dog"),
        );

        state.record_conflicts(&[first]);
        state.record_conflicts(std::slice::from_ref(&second));

        assert_eq!(state.outstanding_conflicts, vec![second]);
        assert!(state.take_conflict("e1").is_some());
        assert!(state.conflict("e1").is_none());
    }

    #[test]
    fn test_state_round_trips_with_camel_case_keys() {
        let mut state = SyncState::with_client_id("device-a".to_string());
        state.mark_deleted("e1");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["clientId"], "device-a");
        assert!(json["lastSyncAt"].is_null());
        assert_eq!(json["pendingDeletedIds"][0], "e1");
    }
}
