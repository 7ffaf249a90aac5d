//! Wire types for `POST /api/words/sync`
//!
//! Both directions are decoded into typed values and rejected on shape
//! mismatch; nothing past this module sees raw JSON. Entries that arrive
//! without `updatedAt` are stamped during decode.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Conflict, Entry};
use crate::timestamp::Timestamp;

/// Delta sent by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub client_id: String,
    /// The device's watermark; `None` for a device that never synced
    #[serde(default)]
    pub since: Option<Timestamp>,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub deleted_ids: Vec<String>,
}

/// Server answer to a [`SyncRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Post-merge state of every entry changed after `since`
    #[serde(default)]
    pub entries: Vec<Entry>,
    /// Tombstoned ids after `since`, plus acknowledged deletions
    #[serde(default)]
    pub deleted_ids: Vec<String>,
    /// Merge time, the device's next watermark
    pub server_time: Timestamp,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed sync payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid entry at index {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },
    #[error("Invalid conflict for '{id}': {reason}")]
    InvalidConflict { id: String, reason: String },
    #[error("deletedIds must not contain blank ids")]
    BlankDeletedId,
}

impl SyncRequest {
    /// Decode a request body, stamping entries that lack `updatedAt` with `now`.
    pub fn decode(body: &[u8], now: Timestamp) -> Result<Self, ProtocolError> {
        let mut request: Self = serde_json::from_slice(body)?;
        normalize_entries(&mut request.entries, now)?;
        if request.deleted_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ProtocolError::BlankDeletedId);
        }
        Ok(request)
    }
}

impl SyncResponse {
    /// Decode a response body. Entries without `updatedAt` get `serverTime`.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut response: Self = serde_json::from_slice(body)?;
        let server_time = response.server_time;
        normalize_entries(&mut response.entries, server_time)?;
        for conflict in &mut response.conflicts {
            if conflict.local.is_none() && conflict.remote.is_none() {
                return Err(ProtocolError::InvalidConflict {
                    id: conflict.id.clone(),
                    reason: "neither side carries an entry".to_string(),
                });
            }
            for entry in [&mut conflict.local, &mut conflict.remote]
                .into_iter()
                .flatten()
            {
                if entry.id != conflict.id {
                    return Err(ProtocolError::InvalidConflict {
                        id: conflict.id.clone(),
                        reason: format!("entry id '{}' does not match", entry.id),
                    });
                }
                entry.stamp_if_missing(server_time);
            }
        }
        Ok(response)
    }

    /// Response for a merge that produced nothing to report.
    pub const fn empty(server_time: Timestamp) -> Self {
        Self {
            entries: Vec::new(),
            deleted_ids: Vec::new(),
            server_time,
            conflicts: Vec::new(),
        }
    }
}

fn normalize_entries(entries: &mut [Entry], now: Timestamp) -> Result<(), ProtocolError> {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry
            .validate()
            .map_err(|reason| ProtocolError::InvalidEntry { index, reason })?;
        entry.stamp_if_missing(now);
    }
    Ok(())
}
