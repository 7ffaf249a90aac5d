//! Data models for Vokabel

mod conflict;
mod entry;
mod sync_state;
mod tombstone;

pub use conflict::{Conflict, ConflictKind};
pub use entry::{Entry, INLINE_MEDIA_PREFIX};
pub use sync_state::SyncState;
pub use tombstone::Tombstone;
