use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vokabel_core::sync::Resolution;

#[derive(Parser)]
#[command(name = "vokabel")]
#[command(about = "Keep a personal vocabulary collection in sync across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a word
    #[command(alias = "new")]
    Add {
        /// Word or phrase being learned
        german: String,
        /// Translation
        english: String,
        #[command(flatten)]
        fields: EntryFields,
    },
    /// List words, most recently changed first
    List {
        /// Number of words to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a word; opens $EDITOR when no field flags are given
    Edit {
        /// Entry ID or unique ID prefix
        id: String,
        /// New word or phrase
        #[arg(long)]
        german: Option<String>,
        /// New translation
        #[arg(long)]
        english: Option<String>,
        #[command(flatten)]
        fields: EntryFields,
    },
    /// Delete a word
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Run one sync cycle against the configured server
    Sync,
    /// Show device sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List conflicts awaiting a decision
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict
    Resolve {
        /// Entry ID or unique ID prefix
        id: String,
        /// keep-local, keep-remote or merge
        resolution: Resolution,
    },
    /// Interactive session with debounced background sync
    Shell,
}

/// Optional entry fields shared by `add` and `edit`
#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryFields {
    /// Part of speech (noun, verb, ...)
    #[arg(long = "pos", value_name = "POS")]
    pub part_of_speech: Option<String>,
    /// Example sentence; repeat for several
    #[arg(long = "example", value_name = "SENTENCE")]
    pub examples: Vec<String>,
    /// Image URL
    #[arg(long, value_name = "URL")]
    pub image_url: Option<String>,
    /// Audio URL
    #[arg(long, value_name = "URL")]
    pub audio_url: Option<String>,
    /// Free-text notes
    #[arg(long)]
    pub notes: Option<String>,
}

impl EntryFields {
    pub fn is_empty(&self) -> bool {
        self.part_of_speech.is_none()
            && self.examples.is_empty()
            && self.image_url.is_none()
            && self.audio_url.is_none()
            && self.notes.is_none()
    }
}
