use std::path::Path;

use serde::Serialize;
use vokabel_core::sync::Resolution;
use vokabel_core::timestamp::Timestamp;
use vokabel_core::SyncState;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, format_report, format_timestamp,
    normalize_entry_identifier, open_client, resolve_conflict_id, warn_data_loss, ConflictItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub client_id: String,
    pub server: Option<String>,
    pub entries: usize,
    pub last_sync_at: Option<Timestamp>,
    pub pending_deletions: Vec<String>,
    pub conflicts: usize,
}

pub fn status_item(state: &SyncState, server: Option<&str>, entries: usize) -> StatusItem {
    StatusItem {
        client_id: state.client_id.clone(),
        server: server.map(str::to_string),
        entries,
        last_sync_at: state.last_sync_at,
        pending_deletions: state.pending_deleted_ids.iter().cloned().collect(),
        conflicts: state.outstanding_conflicts.len(),
    }
}

pub fn format_status_lines(status: &StatusItem) -> Vec<String> {
    vec![
        format!("Device:             {}", status.client_id),
        format!(
            "Server:             {}",
            status.server.as_deref().unwrap_or("(offline)")
        ),
        format!("Words:              {}", status.entries),
        format!(
            "Last sync:          {}",
            status
                .last_sync_at
                .map_or_else(|| "never".to_string(), format_timestamp)
        ),
        format!("Pending deletions:  {}", status.pending_deletions.len()),
        format!("Conflicts:          {}", status.conflicts),
    ]
}

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let (client, _config) = open_client(db_path)?;
    if client.transport().is_offline() {
        return Err(CliError::SyncNotConfigured);
    }

    let report = client.sync().await?;
    for line in format_report(&report) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (client, _config) = open_client(db_path)?;
    let state = client.state().await;
    let entries = client.entries().await.len();
    let status = status_item(&state, client.transport().endpoint(), entries);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (client, _config) = open_client(db_path)?;
    let conflicts = client.conflicts().await;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts awaiting a decision.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(id: &str, resolution: Resolution, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let (client, _config) = open_client(db_path)?;
    let conflict_id = resolve_conflict_id(&normalized_id, &client.conflicts().await)?;

    let outcome = client.resolve(&conflict_id, resolution).await?;
    warn_data_loss(&client).await;
    match outcome {
        Some(entry) => println!("{} -> {} ({resolution})", entry.id, entry.summary()),
        None => println!("{conflict_id} -> deleted ({resolution})"),
    }
    if !client.transport().is_offline() {
        println!("Run `vokabel sync` to send the decision to the server.");
    }
    Ok(())
}
