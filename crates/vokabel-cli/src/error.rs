use std::io;

use thiserror::Error;
use vokabel_core::config::ConfigError;
use vokabel_core::sync::SyncError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] vokabel_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Both the word and its translation are required")]
    MissingText,
    #[error("Entry ID cannot be empty")]
    EmptyEntryId,
    #[error("Entry not found for id/prefix: {0}")]
    EntryNotFound(String),
    #[error("{0}")]
    AmbiguousEntryId(String),
    #[error("No outstanding conflict for entry: {0}")]
    NoConflict(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Edited entry is not valid: {0}")]
    InvalidEdit(String),
    #[error("Sync is not configured. Set VOKABEL_SERVER_URL (and VOKABEL_SYNC_TOKEN if the server requires one).")]
    SyncNotConfigured,
}
