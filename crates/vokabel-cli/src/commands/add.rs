use std::path::Path;

use vokabel_core::util::normalize_text_option;
use vokabel_core::Entry;

use crate::cli::EntryFields;
use crate::commands::common::{apply_fields, open_client, warn_data_loss};
use crate::error::CliError;

/// Build a new entry from command-line text.
pub fn new_entry(german: &str, english: &str, fields: &EntryFields) -> Result<Entry, CliError> {
    let german = normalize_text_option(Some(german.to_string())).ok_or(CliError::MissingText)?;
    let english = normalize_text_option(Some(english.to_string())).ok_or(CliError::MissingText)?;
    Ok(apply_fields(Entry::new(german, english), fields))
}

pub async fn run_add(
    german: &str,
    english: &str,
    fields: &EntryFields,
    db_path: &Path,
) -> Result<(), CliError> {
    let entry = new_entry(german, english, fields)?;
    let (client, _config) = open_client(db_path)?;
    let entry = client.upsert(entry).await?;
    warn_data_loss(&client).await;

    println!("{}", entry.id);
    Ok(())
}
