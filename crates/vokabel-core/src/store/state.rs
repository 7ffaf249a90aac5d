//! Persistence for [`SyncState`]

use super::kv::KeyValueStore;
use crate::error::Result;
use crate::models::SyncState;

/// Key under which the sync state is stored
pub const SYNC_STATE_KEY: &str = "vokabel.syncState";

impl SyncState {
    /// Load the stored state, creating and saving a fresh one (with a new
    /// client id) when none exists.
    pub fn load_or_init<K: KeyValueStore>(kv: &mut K) -> Result<Self> {
        if let Some(raw) = kv.get(SYNC_STATE_KEY)? {
            return Ok(serde_json::from_str(&raw)?);
        }
        let state = Self::new();
        tracing::info!(client_id = %state.client_id, "Initialized sync state");
        state.save(kv)?;
        Ok(state)
    }

    /// Write the state through to `kv`.
    pub fn save<K: KeyValueStore>(&self, kv: &mut K) -> Result<()> {
        let payload = serde_json::to_string(self)?;
        kv.set(SYNC_STATE_KEY, &payload)
    }
}
