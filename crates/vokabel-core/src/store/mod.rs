//! Local persistence: key-value primitive, entry store, and sync state.

mod degrade;
mod entry_store;
mod kv;
mod state;

pub use degrade::{Degradation, PersistReport};
pub use entry_store::{ENTRIES_KEY, EntryStore};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use state::SYNC_STATE_KEY;
