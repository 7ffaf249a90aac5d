//! Deletion marker model

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Records that an entry was deleted so other devices can drop their copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Identifier of the deleted entry
    pub id: String,
    /// When the server applied the deletion
    pub deleted_at: Timestamp,
}

impl Tombstone {
    /// Create a tombstone for `id` deleted at `deleted_at`.
    pub fn new(id: impl Into<String>, deleted_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            deleted_at,
        }
    }
}
