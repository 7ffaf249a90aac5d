use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use vokabel_core::config::ClientConfig;
use vokabel_core::db::SqliteKeyValueStore;
use vokabel_core::store::PersistReport;
use vokabel_core::sync::{SyncClient, SyncReport};
use vokabel_core::timestamp::Timestamp;
use vokabel_core::util::{normalize_text_option, short_id};
use vokabel_core::{Conflict, Entry};

use crate::cli::EntryFields;
use crate::error::CliError;
use crate::transport::CliTransport;

pub type Client = SyncClient<SqliteKeyValueStore, CliTransport>;

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: String,
    pub german: String,
    pub english: String,
    pub part_of_speech: Option<String>,
    pub summary: String,
    pub updated_at: Option<Timestamp>,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: String,
    pub kind: &'static str,
    pub local: Option<Entry>,
    pub remote: Option<Entry>,
}

/// The user-editable part of an entry, as shown in `$EDITOR`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableEntry {
    pub german: String,
    pub english: String,
    #[serde(default)]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl EditableEntry {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            german: entry.german.clone(),
            english: entry.english.clone(),
            part_of_speech: entry.part_of_speech.clone(),
            examples: entry.examples.clone(),
            image_url: entry.image_url.clone(),
            audio_url: entry.audio_url.clone(),
            notes: entry.notes.clone(),
        }
    }

    pub fn apply(self, mut entry: Entry) -> Result<Entry, CliError> {
        let german = normalize_text_option(Some(self.german)).ok_or(CliError::MissingText)?;
        let english = normalize_text_option(Some(self.english)).ok_or(CliError::MissingText)?;
        entry.german = german;
        entry.english = english;
        entry.part_of_speech = normalize_text_option(self.part_of_speech);
        entry.examples = normalize_examples(self.examples);
        entry.image_url = normalize_text_option(self.image_url);
        entry.audio_url = normalize_text_option(self.audio_url);
        entry.notes = normalize_text_option(self.notes);
        Ok(entry)
    }
}

pub fn open_client(db_path: &Path) -> Result<(Client, ClientConfig), CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = ClientConfig::from_env()?;
    let kv = SqliteKeyValueStore::open(db_path)?.with_quota(config.storage_quota_bytes);
    let transport = CliTransport::from_config(&config)?;
    let client = SyncClient::open(kv, transport)?;
    Ok((client, config))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("VOKABEL_LOCAL_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vokabel")
        .join("vokabel.db")
}

pub fn normalize_entry_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntryId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Exact id first, then a unique prefix.
pub async fn resolve_entry(query: &str, client: &Client) -> Result<Entry, CliError> {
    if let Some(entry) = client.entry(query).await {
        return Ok(entry);
    }

    let matching_ids = client.ids_with_prefix(query, 3).await;
    let id = pick_unique_id(query, &matching_ids)?;
    client
        .entry(&id)
        .await
        .ok_or_else(|| CliError::EntryNotFound(query.to_string()))
}

/// Conflict ids are matched the same way as entry ids.
pub fn resolve_conflict_id(query: &str, conflicts: &[Conflict]) -> Result<String, CliError> {
    if conflicts.iter().any(|conflict| conflict.id == query) {
        return Ok(query.to_string());
    }
    let matching_ids = conflicts
        .iter()
        .filter(|conflict| conflict.id.starts_with(query))
        .map(|conflict| conflict.id.clone())
        .take(3)
        .collect::<Vec<_>>();
    pick_unique_id(query, &matching_ids).map_err(|error| match error {
        CliError::EntryNotFound(query) => CliError::NoConflict(query),
        other => other,
    })
}

pub fn pick_unique_id(query: &str, matching_ids: &[String]) -> Result<String, CliError> {
    match matching_ids {
        [] => Err(CliError::EntryNotFound(query.to_string())),
        [id] => Ok(id.clone()),
        _ => {
            let options = matching_ids
                .iter()
                .take(3)
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Apply `--pos`, `--example`, ... flags. An empty value clears the field.
pub fn apply_fields(mut entry: Entry, fields: &EntryFields) -> Entry {
    if let Some(value) = &fields.part_of_speech {
        entry.part_of_speech = normalize_text_option(Some(value.clone()));
    }
    if !fields.examples.is_empty() {
        entry.examples = normalize_examples(fields.examples.clone());
    }
    if let Some(value) = &fields.image_url {
        entry.image_url = normalize_text_option(Some(value.clone()));
    }
    if let Some(value) = &fields.audio_url {
        entry.audio_url = normalize_text_option(Some(value.clone()));
    }
    if let Some(value) = &fields.notes {
        entry.notes = normalize_text_option(Some(value.clone()));
    }
    entry
}

fn normalize_examples(examples: Vec<String>) -> Vec<String> {
    examples
        .into_iter()
        .filter_map(|example| normalize_text_option(Some(example)))
        .collect()
}

pub fn format_entry_lines(entries: &[Entry], now: Timestamp) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let id = short_id(&entry.id);
            let summary = truncate_chars(&entry.summary(), 40);
            let relative_time = entry_relative_time(entry, now);
            format!("{id:<13}  {summary:<40}  {relative_time}")
        })
        .collect()
}

pub fn entry_to_list_item(entry: &Entry, now: Timestamp) -> EntryListItem {
    EntryListItem {
        id: entry.id.clone(),
        german: entry.german.clone(),
        english: entry.english.clone(),
        part_of_speech: entry.part_of_speech.clone(),
        summary: entry.summary(),
        updated_at: entry.updated_at,
        relative_time: entry_relative_time(entry, now),
    }
}

fn entry_relative_time(entry: &Entry, now: Timestamp) -> String {
    entry.updated_at.map_or_else(
        || "never".to_string(),
        |at| format_relative_time(at.timestamp_millis(), now.timestamp_millis()),
    )
}

pub fn conflict_to_item(conflict: &Conflict) -> ConflictItem {
    ConflictItem {
        id: conflict.id.clone(),
        kind: conflict.kind.as_str(),
        local: conflict.local.clone(),
        remote: conflict.remote.clone(),
    }
}

pub fn format_conflict_lines(conflicts: &[Conflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let local = conflict
                .local
                .as_ref()
                .map_or_else(|| "(deleted)".to_string(), Entry::summary);
            let remote = conflict
                .remote
                .as_ref()
                .map_or_else(|| "(missing)".to_string(), Entry::summary);
            format!(
                "{:<13}  {:<6}  local: {local}  remote: {remote}",
                short_id(&conflict.id),
                conflict.kind.as_str(),
            )
        })
        .collect()
}

pub fn format_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: sent {} ({} deletions), received {}, removed {}",
        report.sent, report.sent_deletions, report.accepted, report.removed
    )];
    if report.has_conflicts() {
        lines.push(format!(
            "{} conflict(s) need a decision; run `vokabel conflicts`",
            report.conflicts.len()
        ));
    }
    if let Some(loss) = &report.data_loss {
        lines.extend(format_data_loss(loss));
    }
    lines
}

pub fn format_data_loss(report: &PersistReport) -> Vec<String> {
    let mut lines = Vec::new();
    if !report.stripped_media.is_empty() {
        lines.push(format!(
            "Storage full: removed inline media from {} entries",
            report.stripped_media.len()
        ));
    }
    if !report.dropped.is_empty() {
        let ids = report
            .dropped
            .iter()
            .map(|id| short_id(id))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "Storage full: dropped {} entries: {ids}",
            report.dropped.len()
        ));
    }
    lines
}

/// Print anything the local store had to discard to stay within its quota.
pub async fn warn_data_loss(client: &Client) {
    if let Some(report) = client.take_data_loss().await {
        for line in format_data_loss(&report) {
            eprintln!("Warning: {line}");
        }
    }
}

pub fn format_timestamp(at: Timestamp) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn capture_editor_input_with_initial(initial_content: &str) -> Result<String, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_entry_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let edited = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(edited)
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_entry_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("vokabel-entry-{}-{now}.json", std::process::id()))
}
