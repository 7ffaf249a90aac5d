//! Database layer for Vokabel

mod collection;
mod connection;
mod kv_store;
mod migrations;

pub use collection::SqliteCollection;
pub use connection::Database;
pub use kv_store::SqliteKeyValueStore;
