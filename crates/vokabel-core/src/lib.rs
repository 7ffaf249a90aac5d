//! vokabel-core - Core library for Vokabel
//!
//! This crate contains the vocabulary entry model, the device-local entry
//! store, and the delta sync protocol shared by the API server and the CLI:
//! the server-side merge, the device sync client, and conflict resolution.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;
pub mod timestamp;
pub mod util;

pub use error::{Error, Result};
pub use models::{Conflict, ConflictKind, Entry, SyncState, Tombstone};
