//! Delta sync between a device and the authoritative collection

mod client;
mod collection;
mod merge;
mod protocol;
mod resolve;
mod scheduler;
mod transport;

pub use client::{SyncClient, SyncReport};
pub use collection::{sort_newest_first, MemoryCollection, WordCollection};
pub use merge::{is_concurrent, merge_delta, MergeStats};
pub use protocol::{ProtocolError, SyncRequest, SyncResponse};
pub use resolve::{merge_entries, Resolution};
pub use scheduler::{SyncEvent, SyncScheduler, DEFAULT_DEBOUNCE};
pub use transport::{HttpTransport, LocalTransport, SyncError, SyncTransport};
