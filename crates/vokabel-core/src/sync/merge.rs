//! Server-side merge of one device delta into the shared collection
//!
//! Every entry converges independently: last writer wins by `updatedAt`, ties
//! favour the stored record, and an incoming write is held back as a conflict
//! when both sides changed the record after the device's watermark.
//!
//! Deltas sent back are selected by the server time a record was stored, not
//! by its `updatedAt`, so a write made offline before another device's
//! watermark still reaches that device.

use std::collections::HashSet;

use super::collection::WordCollection;
use super::protocol::{SyncRequest, SyncResponse};
use crate::error::Result;
use crate::models::{Conflict, Entry, Tombstone};
use crate::timestamp::Timestamp;
use crate::util::short_id;

/// Counters logged after every merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

/// Both sides touched the record after the point they last agreed on.
pub fn is_concurrent(since: Option<Timestamp>, existing: &Entry, incoming: &Entry) -> bool {
    since.is_some_and(|since| {
        existing.modified_at() > since
            && incoming.modified_at() > since
            && incoming.modified_at() != existing.modified_at()
    })
}

/// Merge `request` into `collection` at server time `now` and build the
/// response for the requesting device.
pub fn merge_delta<C>(collection: &mut C, request: &SyncRequest, now: Timestamp) -> Result<SyncResponse>
where
    C: WordCollection + ?Sized,
{
    let since = request.since;
    let mut stats = MergeStats::default();
    let mut conflicts = Vec::new();

    for incoming in &request.entries {
        match collection.get(&incoming.id)? {
            None => {
                collection.put(incoming, now)?;
                collection.clear_tombstone(&incoming.id)?;
                stats.inserted += 1;
            }
            Some(existing) if is_concurrent(since, &existing, incoming) => {
                tracing::debug!(id = %short_id(&incoming.id), "Concurrent update held back");
                conflicts.push(Conflict::update(incoming.clone(), existing));
            }
            Some(existing) if !incoming.is_newer_than(&existing) => {
                stats.unchanged += 1;
            }
            Some(_) => {
                collection.put(incoming, now)?;
                collection.clear_tombstone(&incoming.id)?;
                stats.updated += 1;
            }
        }
    }

    let mut acknowledged = Vec::new();
    for id in &request.deleted_ids {
        match collection.get(id)? {
            None => acknowledged.push(id.clone()),
            Some(existing) if existing.changed_since(since) => {
                tracing::debug!(id = %short_id(id), "Delete of concurrently edited entry held back");
                conflicts.push(Conflict::delete(existing));
            }
            Some(_) => {
                collection.remove(id)?;
                collection.put_tombstone(&Tombstone::new(id.clone(), now))?;
                acknowledged.push(id.clone());
                stats.deleted += 1;
            }
        }
    }

    let entries = collection.changed_since(since)?;
    let mut deleted_ids = match since {
        Some(since) => collection
            .tombstones_since(since)?
            .into_iter()
            .map(|tombstone| tombstone.id)
            .collect(),
        None => Vec::new(),
    };
    let mut seen: HashSet<String> = deleted_ids.iter().cloned().collect();
    for id in acknowledged {
        if seen.insert(id.clone()) {
            deleted_ids.push(id);
        }
    }

    tracing::info!(
        client = %short_id(&request.client_id),
        since = ?since,
        received = request.entries.len(),
        inserted = stats.inserted,
        updated = stats.updated,
        unchanged = stats.unchanged,
        deleted = stats.deleted,
        returned = entries.len(),
        conflicts = conflicts.len(),
        "Merged sync delta"
    );

    Ok(SyncResponse {
        entries,
        deleted_ids,
        server_time: now,
        conflicts,
    })
}
