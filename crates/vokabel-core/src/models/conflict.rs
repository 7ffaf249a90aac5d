//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Entry;

/// Which kind of write collided with a concurrent remote change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Both sides edited the entry after the shared watermark
    Update,
    /// This device deleted an entry the server changed after the watermark
    Delete,
}

impl ConflictKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown conflict type '{other}'")),
        }
    }
}

/// A concurrent edit detected by one merge call, awaiting a user decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Entry involved in the conflict
    pub id: String,
    /// Conflict kind, serialized as `type`
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Value this device proposed (`None` for a deletion)
    pub local: Option<Entry>,
    /// Authoritative value at merge time (`None` when the server had none)
    pub remote: Option<Entry>,
}

impl Conflict {
    /// Incoming update rejected because the stored record also changed.
    pub fn update(local: Entry, remote: Entry) -> Self {
        Self {
            id: remote.id.clone(),
            kind: ConflictKind::Update,
            local: Some(local),
            remote: Some(remote),
        }
    }

    /// Incoming deletion rejected because the stored record changed.
    pub fn delete(remote: Entry) -> Self {
        Self {
            id: remote.id.clone(),
            kind: ConflictKind::Delete,
            local: None,
            remote: Some(remote),
        }
    }

    pub const fn is_delete(&self) -> bool {
        matches!(self.kind, ConflictKind::Delete)
    }
}
