//! User decisions for outstanding conflicts

use std::fmt;
use std::str::FromStr;

use crate::models::Entry;

/// How the user settled a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Re-assert this device's value (or deletion) so it wins the next cycle
    KeepLocal,
    /// Take the server's value
    KeepRemote,
    /// Field-wise combination, local non-empty fields first (updates only)
    Merge,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep-local",
            Self::KeepRemote => "keep-remote",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "keep-local" | "local" => Ok(Self::KeepLocal),
            "keep-remote" | "remote" => Ok(Self::KeepRemote),
            "merge" => Ok(Self::Merge),
            other => Err(format!(
                "unknown resolution '{other}' (expected keep-local, keep-remote or merge)"
            )),
        }
    }
}

/// Combine two versions of the same entry field by field. Non-blank local
/// values win; `updated_at` keeps whichever side is set, local first.
pub fn merge_entries(local: &Entry, remote: &Entry) -> Entry {
    Entry {
        id: local.id.clone(),
        german: pick_text(&local.german, &remote.german),
        english: pick_text(&local.english, &remote.english),
        part_of_speech: pick_option(
            local.part_of_speech.as_deref(),
            remote.part_of_speech.as_deref(),
        ),
        examples: if local.examples.is_empty() {
            remote.examples.clone()
        } else {
            local.examples.clone()
        },
        image_url: pick_option(local.image_url.as_deref(), remote.image_url.as_deref()),
        audio_url: pick_option(local.audio_url.as_deref(), remote.audio_url.as_deref()),
        notes: pick_option(local.notes.as_deref(), remote.notes.as_deref()),
        created_at: local.created_at.or(remote.created_at),
        updated_at: local.updated_at.or(remote.updated_at),
        client_id: local.client_id.clone().or_else(|| remote.client_id.clone()),
    }
}

fn pick_text(local: &str, remote: &str) -> String {
    if local.trim().is_empty() {
        remote.to_string()
    } else {
        local.to_string()
    }
}

fn pick_option(local: Option<&str>, remote: Option<&str>) -> Option<String> {
    match local {
        Some(value) if !value.trim().is_empty() => Some(value.to_string()),
        _ => remote.map(ToString::to_string),
    }
}
